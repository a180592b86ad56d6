//! Shared value types that flow between the codec, filter, and egress modules.

use std::time::SystemTime;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// One decoded, normalized position report. Immutable once built by the codec.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub device_id: String,
    pub short_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_knots: f64,
    pub speed_kmh: f64,
    pub heading_degrees: f64,
    pub gps_date: Option<GpsDate>,
    pub gps_time: Option<GpsTime>,
    pub received_at: SystemTime,
    pub raw_hex: String,
    pub protocol_tag: ProtocolTag,
}

impl PositionReport {
    /// Whether this report carries a real fix (not the `(0,0)` sentinel).
    pub fn has_fix(&self) -> bool {
        self.latitude.abs() >= 1e-6 || self.longitude.abs() >= 1e-6
    }

    /// GPS timestamp as seconds-since-epoch-of-day, used for ordering comparisons.
    /// Returns `None` if either the date or the time is missing.
    pub fn gps_instant_key(&self) -> Option<i64> {
        let d = self.gps_date.as_ref()?;
        let t = self.gps_time.as_ref()?;
        Some(
            ((d.year as i64 * 10000) + (d.month as i64 * 100) + d.day as i64) * 1_000_000
                + (t.hour as i64 * 10000 + t.minute as i64 * 100 + t.second as i64),
        )
    }

    /// Real calendar GPS timestamp, used to compute Δt between two fixes.
    /// Unlike [`Self::gps_instant_key`] (ordering only), this yields an
    /// actual duration when differenced. `None` if either half is missing
    /// or the fields don't form a valid date/time.
    pub fn gps_datetime(&self) -> Option<NaiveDateTime> {
        let d = self.gps_date.as_ref()?;
        let t = self.gps_time.as_ref()?;
        let date = NaiveDate::from_ymd_opt(2000 + d.year as i32, d.month as u32, d.day as u32)?;
        let time = NaiveTime::from_hms_opt(t.hour as u32, t.minute as u32, t.second as u32)?;
        Some(NaiveDateTime::new(date, time))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsDate {
    pub day: u8,
    pub month: u8,
    /// Two-digit year of the century (e.g. 25 for 2025).
    pub year: u8,
}

impl GpsDate {
    /// `DDMMYY`, as embedded verbatim in the RPG frame.
    pub fn as_ddmmyy(&self) -> String {
        format!("{:02}{:02}{:02}", self.day, self.month, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl GpsTime {
    /// `HHMMSS`, as embedded verbatim in the RPG frame.
    pub fn as_hhmmss(&self) -> String {
        format!("{:02}{:02}{:02}", self.hour, self.minute, self.second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolTag {
    BinaryTq,
    Nmea,
    Registration,
}

impl ProtocolTag {
    pub fn log_tag(&self) -> Option<&'static str> {
        match self {
            ProtocolTag::BinaryTq => Some("UDP"),
            ProtocolTag::Nmea => Some("NMEA"),
            ProtocolTag::Registration => None,
        }
    }
}

/// Result of classifying+decoding one received buffer. Mirrors the
/// discriminated union called for in the redesign notes: no exceptions,
/// no sentinel dicts, just a closed set of outcomes the caller matches on.
#[derive(Debug)]
pub enum DecodeResult {
    Frame(PositionReport),
    Registration(String),
    Ignore(String),
    Error(crate::error::CodecError),
}

/// Liveness counters, updated by the session manager and read by the
/// heartbeat emitter and the health endpoint. Kept outside `GatewayState`
/// itself so it can be cheaply cloned into background tasks.
#[derive(Debug, Default)]
pub struct LivenessCounters {
    pub total_messages: std::sync::atomic::AtomicU64,
    pub active_sessions: std::sync::atomic::AtomicI64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LivenessSnapshot {
    pub status: &'static str,
    pub timestamp: String,
    pub server_id: String,
    pub uptime_seconds: u64,
    pub port: u16,
    pub clients: i64,
    pub messages: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HeartbeatDatagram {
    pub timestamp: String,
    pub server_id: String,
    pub status: String,
    pub uptime_seconds: u64,
    pub port: u16,
    pub clients: i64,
    pub messages: u64,
}
