//! C2 — Quality Filter.
//!
//! Applies the ordered acceptance rules from §4.2 to incoming
//! [`PositionReport`]s, using one [`LastKnown`] entry per device to judge
//! plausibility against the previous accepted fix.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::config::FilterConfig;
use crate::types::PositionReport;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone)]
pub struct LastKnown {
    pub latitude: f64,
    pub longitude: f64,
    pub gps_instant_key: Option<i64>,
    pub gps_datetime: Option<chrono::NaiveDateTime>,
    pub received_at: SystemTime,
}

/// Per-device last-accepted-fix table, guarded by the caller (the session
/// manager holds this behind a `tokio::sync::Mutex`).
#[derive(Debug, Default)]
pub struct QualityFilter {
    last_known: HashMap<String, LastKnown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    RejectNoFix,
    RejectClockRegression,
    RejectDuplicate,
    RejectShortWindowJump,
    RejectImpliedSpeed,
}

impl Verdict {
    /// The contract string logged and (eventually) surfaced to operators —
    /// see §4.2/§7. Kept distinct from `Debug` so the wire/log format
    /// doesn't drift if the enum's variant names ever change.
    pub fn reason(&self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::RejectNoFix => "gps_zero",
            Verdict::RejectClockRegression => "out_of_order",
            Verdict::RejectDuplicate => "dupe_or_noise",
            Verdict::RejectShortWindowJump => "jump_shortdt",
            Verdict::RejectImpliedSpeed => "jump_speed",
        }
    }
}

impl QualityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates one report against the device's last accepted fix and, if
    /// accepted, updates that fix. Rules are applied in the order listed in
    /// §4.2; the first matching rule decides the outcome.
    pub fn evaluate(&mut self, report: &PositionReport, cfg: &FilterConfig) -> Verdict {
        if !report.has_fix() {
            return Verdict::RejectNoFix;
        }

        let key = report.device_id.clone();
        let Some(prev) = self.last_known.get(&key).cloned() else {
            self.last_known.insert(key, Self::snapshot(report));
            return Verdict::Accept;
        };

        if let (Some(prev_key), Some(cur_key)) = (prev.gps_instant_key, report.gps_instant_key()) {
            if cur_key < prev_key {
                return Verdict::RejectClockRegression;
            }
        }

        let distance_m = haversine_distance_m(prev.latitude, prev.longitude, report.latitude, report.longitude);
        let elapsed_s = Self::elapsed_seconds(&prev, report);

        if distance_m < cfg.min_move_to_accept_m && elapsed_s < cfg.short_dt_s as f64 {
            return Verdict::RejectDuplicate;
        }

        if elapsed_s < cfg.short_dt_s as f64 && distance_m > cfg.max_dist_step_m {
            return Verdict::RejectShortWindowJump;
        }

        if elapsed_s > 0.0 {
            let implied_kmh = (distance_m / 1000.0) / (elapsed_s / 3600.0);
            if implied_kmh > cfg.max_speed_kmh {
                return Verdict::RejectImpliedSpeed;
            }
        }

        self.last_known.insert(key, Self::snapshot(report));
        Verdict::Accept
    }

    /// Δt between the previous accepted fix and this report. Uses the GPS
    /// clock when both points carry one (§4.2: "rules reject/accept based
    /// on GPS-time deltas when available"); falls back to wall-clock
    /// arrival time when either is missing.
    fn elapsed_seconds(prev: &LastKnown, report: &PositionReport) -> f64 {
        if let (Some(prev_dt), Some(cur_dt)) = (prev.gps_datetime, report.gps_datetime()) {
            return (cur_dt - prev_dt).num_milliseconds() as f64 / 1000.0;
        }
        report
            .received_at
            .duration_since(prev.received_at)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn snapshot(report: &PositionReport) -> LastKnown {
        LastKnown {
            latitude: report.latitude,
            longitude: report.longitude,
            gps_instant_key: report.gps_instant_key(),
            gps_datetime: report.gps_datetime(),
            received_at: report.received_at,
        }
    }
}

/// Great-circle distance between two lat/lon points, in meters.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1_r, lat2_r) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GpsDate, GpsTime, ProtocolTag};
    use std::time::Duration;

    fn report_at(id: &str, lat: f64, lon: f64, t: SystemTime, second: u8) -> PositionReport {
        report_at_hms(id, lat, lon, t, 0, 0, second)
    }

    fn report_at_hms(id: &str, lat: f64, lon: f64, t: SystemTime, hour: u8, minute: u8, second: u8) -> PositionReport {
        PositionReport {
            device_id: id.to_string(),
            short_id: id[id.len() - 5..].to_string(),
            latitude: lat,
            longitude: lon,
            speed_knots: 0.0,
            speed_kmh: 0.0,
            heading_degrees: 0.0,
            gps_date: Some(GpsDate { day: 1, month: 1, year: 25 }),
            gps_time: Some(GpsTime { hour, minute, second }),
            received_at: t,
            raw_hex: String::new(),
            protocol_tag: ProtocolTag::BinaryTq,
        }
    }

    #[test]
    fn i3_first_fix_for_a_device_is_always_accepted() {
        let mut filter = QualityFilter::new();
        let cfg = FilterConfig::default();
        let report = report_at("207666800001", -34.6, -58.5, SystemTime::now(), 0);
        assert_eq!(filter.evaluate(&report, &cfg), Verdict::Accept);
    }

    #[test]
    fn i4_no_fix_is_rejected_before_consulting_history() {
        let mut filter = QualityFilter::new();
        let cfg = FilterConfig::default();
        let report = report_at("207666800002", 0.0, 0.0, SystemTime::now(), 0);
        assert_eq!(filter.evaluate(&report, &cfg), Verdict::RejectNoFix);
    }

    #[test]
    fn s3_implausible_teleport_within_short_window_is_rejected() {
        let mut filter = QualityFilter::new();
        let cfg = FilterConfig::default();
        let t0 = SystemTime::now();
        let first = report_at("207666800003", -34.6, -58.5, t0, 0);
        assert_eq!(filter.evaluate(&first, &cfg), Verdict::Accept);

        let t1 = t0 + Duration::from_secs(5);
        // ~5 degrees away, nowhere near reachable in 5 seconds.
        let jump = report_at("207666800003", -39.6, -58.5, t1, 5);
        assert_eq!(filter.evaluate(&jump, &cfg), Verdict::RejectShortWindowJump);
    }

    #[test]
    fn s4_duplicate_within_noise_floor_is_rejected() {
        let mut filter = QualityFilter::new();
        let cfg = FilterConfig::default();
        let t0 = SystemTime::now();
        let first = report_at("207666800004", -34.6, -58.5, t0, 0);
        assert_eq!(filter.evaluate(&first, &cfg), Verdict::Accept);

        let t1 = t0 + Duration::from_secs(2);
        let jitter = report_at("207666800004", -34.600001, -58.500001, t1, 2);
        assert_eq!(filter.evaluate(&jitter, &cfg), Verdict::RejectDuplicate);
    }

    #[test]
    fn i6_clock_regression_is_rejected_even_with_plausible_distance() {
        let mut filter = QualityFilter::new();
        let cfg = FilterConfig::default();
        let t0 = SystemTime::now();
        let first = report_at("207666800005", -34.6, -58.5, t0, 30);
        assert_eq!(filter.evaluate(&first, &cfg), Verdict::Accept);

        let t1 = t0 + Duration::from_secs(1);
        let earlier_gps_time = report_at("207666800005", -34.6005, -58.5005, t1, 10);
        assert_eq!(filter.evaluate(&earlier_gps_time, &cfg), Verdict::RejectClockRegression);
    }

    #[test]
    fn reconnection_replay_uses_gps_time_not_wall_clock_delta() {
        // A device buffers frames while its radio link is down and replays
        // them back-to-back on reconnect: GPS timestamps are hours apart,
        // but both arrive within the same second of wall-clock time.
        let mut filter = QualityFilter::new();
        let cfg = FilterConfig::default();
        let t0 = SystemTime::now();
        let first = report_at_hms("207666800006", -34.6000, -58.5000, t0, 8, 0, 0);
        assert_eq!(filter.evaluate(&first, &cfg), Verdict::Accept);

        // ~1.8km over 3 simulated GPS hours is nowhere near implausible,
        // but over 1 wall-clock second it would imply thousands of km/h.
        let t1 = t0 + Duration::from_secs(1);
        let replayed = report_at_hms("207666800006", -34.6160, -58.5000, t1, 11, 0, 0);
        assert_eq!(filter.evaluate(&replayed, &cfg), Verdict::Accept);
    }

    #[test]
    fn haversine_known_distance_buenos_aires_to_cordoba() {
        // ~650km straight-line distance, ballpark check.
        let d = haversine_distance_m(-34.6037, -58.3816, -31.4201, -64.1888);
        assert!((600_000.0..=720_000.0).contains(&d), "distance was {d}");
    }
}
