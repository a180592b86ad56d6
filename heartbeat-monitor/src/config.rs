//! Startup configuration for the heartbeat monitor, mirroring the gateway's
//! env-var-driven config layer.

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
pub struct MonitorConfig {
    pub listen_host: String,
    pub listen_port: u16,

    /// Seconds without a heartbeat before the gateway is considered down.
    pub timeout_seconds: u64,

    /// Minimum gap between two consecutive down alerts.
    pub alert_cooldown_seconds: u64,

    /// Optional shell command invoked once per outage. Empty disables it.
    pub restart_hook: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            listen_host: env_string_or("TQ_MONITOR_LISTEN_HOST", "0.0.0.0"),
            listen_port: env_or("TQ_MONITOR_LISTEN_PORT", 9001),
            timeout_seconds: env_or("TQ_MONITOR_TIMEOUT_SECONDS", 300),
            alert_cooldown_seconds: env_or("TQ_MONITOR_ALERT_COOLDOWN_SECONDS", 600),
            restart_hook: env_string_or("TQ_MONITOR_RESTART_HOOK", ""),
        }
    }
}

impl MonitorConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_historical_deployment() {
        let cfg = MonitorConfig {
            listen_host: "0.0.0.0".into(),
            listen_port: 9001,
            timeout_seconds: 300,
            alert_cooldown_seconds: 600,
            restart_hook: String::new(),
        };
        assert_eq!(cfg.listen_addr(), "0.0.0.0:9001");
        assert_eq!(cfg.timeout_seconds, 300);
    }
}
