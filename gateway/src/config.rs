//! Startup configuration, assembled once from the environment with
//! hardcoded defaults matching the historical deployment (§4.9).

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!("{name} set to {v:?} but could not be parsed, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_string_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_host: String,
    pub listen_port: u16,

    pub udp_platform_host: String,
    pub udp_platform_port: u16,

    pub tcp_mirror_enabled: bool,
    pub tcp_mirror_host: String,
    pub tcp_mirror_port: u16,

    pub heartbeat_enabled: bool,
    pub heartbeat_host: String,
    pub heartbeat_port: u16,
    pub heartbeat_interval_seconds: u64,

    pub health_port: u16,

    pub log_dir: String,

    /// This firmware fleet transmits latitude as an unsigned magnitude;
    /// the true hemisphere is a deployment constant, not inferred per-message.
    pub southern_hemisphere: bool,
    pub western_hemisphere: bool,

    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    pub max_speed_kmh: f64,
    pub max_dist_step_m: f64,
    pub short_dt_s: i64,
    pub min_move_to_accept_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 200.0,
            max_dist_step_m: 500.0,
            short_dt_s: 10,
            min_move_to_accept_m: 5.0,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_host: env_string_or("TQ_LISTEN_HOST", "0.0.0.0"),
            listen_port: env_or("TQ_LISTEN_PORT", 5003),

            udp_platform_host: env_string_or("TQ_UDP_HOST", "179.43.115.190"),
            udp_platform_port: env_or("TQ_UDP_PORT", 7007),

            tcp_mirror_enabled: env_or("TQ_MIRROR_ENABLED", true),
            tcp_mirror_host: env_string_or("TQ_MIRROR_HOST", "168.197.48.154"),
            tcp_mirror_port: env_or("TQ_MIRROR_PORT", 5005),

            heartbeat_enabled: env_or("TQ_HEARTBEAT_ENABLED", true),
            heartbeat_host: env_string_or("TQ_HEARTBEAT_HOST", "127.0.0.1"),
            heartbeat_port: env_or("TQ_HEARTBEAT_PORT", 9001),
            heartbeat_interval_seconds: env_or("TQ_HEARTBEAT_INTERVAL_SECONDS", 300),

            health_port: env_or("TQ_HEALTH_PORT", 5004),

            log_dir: env_string_or("TQ_LOG_DIR", "logs"),

            southern_hemisphere: env_or("TQ_SOUTHERN_HEMISPHERE", true),
            western_hemisphere: env_or("TQ_WESTERN_HEMISPHERE", true),

            filter: FilterConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn udp_platform_addr(&self) -> String {
        format!("{}:{}", self.udp_platform_host, self.udp_platform_port)
    }

    pub fn tcp_mirror_addr(&self) -> String {
        format!("{}:{}", self.tcp_mirror_host, self.tcp_mirror_port)
    }

    pub fn heartbeat_addr(&self) -> String {
        format!("{}:{}", self.heartbeat_host, self.heartbeat_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_historical_deployment() {
        // Run in isolation from the process environment.
        let cfg = GatewayConfig {
            listen_host: "0.0.0.0".into(),
            listen_port: 5003,
            udp_platform_host: "179.43.115.190".into(),
            udp_platform_port: 7007,
            tcp_mirror_enabled: true,
            tcp_mirror_host: "168.197.48.154".into(),
            tcp_mirror_port: 5005,
            heartbeat_enabled: true,
            heartbeat_host: "127.0.0.1".into(),
            heartbeat_port: 9001,
            heartbeat_interval_seconds: 300,
            health_port: 5004,
            log_dir: "logs".into(),
            southern_hemisphere: true,
            western_hemisphere: true,
            filter: FilterConfig::default(),
        };
        assert_eq!(cfg.listen_addr(), "0.0.0.0:5003");
        assert_eq!(cfg.udp_platform_addr(), "179.43.115.190:7007");
        assert_eq!(cfg.tcp_mirror_addr(), "168.197.48.154:5005");
    }
}
