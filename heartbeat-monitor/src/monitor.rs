//! State machine: Starting → Healthy → Down → Healthy, grounded in the
//! companion `HeartbeatMonitor` class — timeout detection, alert cooldown,
//! and a single restart-hook attempt per outage.

use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::notifier::Notifier;

/// Wire shape of the datagram sent by the gateway's heartbeat emitter.
/// Only the fields the monitor actually needs are parsed.
#[derive(Debug, Deserialize)]
struct HeartbeatDatagram {
    #[allow(dead_code)]
    timestamp: String,
    server_id: String,
    uptime_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Starting,
    Healthy,
    Down,
}

pub struct Monitor {
    cfg: MonitorConfig,
    notifier: Arc<dyn Notifier>,
    state: State,
    started_at: Instant,
    last_heartbeat_at: Option<Instant>,
    last_server_id: Option<String>,
    last_uptime_seconds: u64,
    last_alert_at: Option<Instant>,
    restart_attempted: bool,
}

impl Monitor {
    pub fn new(cfg: MonitorConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            cfg,
            notifier,
            state: State::Starting,
            started_at: Instant::now(),
            last_heartbeat_at: None,
            last_server_id: None,
            last_uptime_seconds: 0,
            last_alert_at: None,
            restart_attempted: false,
        }
    }

    pub async fn run(mut self) -> Result<(), MonitorError> {
        let addr = self.cfg.listen_addr();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| MonitorError::Bind { addr: addr.clone(), source })?;
        info!("heartbeat monitor listening on {addr}");

        let mut buf = vec![0u8; 2048];
        let mut tick = tokio::time::interval(Duration::from_secs(30));

        loop {
            tokio::select! {
                recv = socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((n, _addr)) => self.on_datagram(&buf[..n]),
                        Err(e) => warn!("heartbeat socket read error: {e}"),
                    }
                }
                _ = tick.tick() => {
                    self.check_timeout();
                }
            }
        }
    }

    fn on_datagram(&mut self, payload: &[u8]) {
        let datagram: HeartbeatDatagram = match serde_json::from_slice(payload) {
            Ok(d) => d,
            Err(e) => {
                warn!("ignoring malformed heartbeat datagram: {e}");
                return;
            }
        };

        let was_down = self.state == State::Down;
        self.last_heartbeat_at = Some(Instant::now());
        self.last_server_id = Some(datagram.server_id.clone());
        self.last_uptime_seconds = datagram.uptime_seconds;
        self.state = State::Healthy;

        if was_down {
            self.restart_attempted = false;
            self.notifier.recovered(&format!(
                "gateway {} recovered, uptime {}s",
                datagram.server_id, datagram.uptime_seconds
            ));
        }
    }

    fn check_timeout(&mut self) {
        let elapsed_since_last = match self.last_heartbeat_at {
            Some(t) => t.elapsed(),
            None => self.started_at.elapsed(),
        };

        if elapsed_since_last.as_secs() <= self.cfg.timeout_seconds {
            return;
        }

        if self.last_heartbeat_at.is_none() && self.started_at.elapsed().as_secs() < self.cfg.timeout_seconds {
            return; // initial grace period before the first expected heartbeat
        }

        if !self.can_alert_again() {
            return;
        }

        self.state = State::Down;
        self.last_alert_at = Some(Instant::now());

        let reason = format!("no heartbeat for {}s", elapsed_since_last.as_secs());
        self.notifier.down(&format!(
            "gateway {} is down: {reason}",
            self.last_server_id.as_deref().unwrap_or("tq_gateway")
        ));

        if !self.restart_attempted {
            self.restart_attempted = true;
            self.attempt_restart();
        }
    }

    fn can_alert_again(&self) -> bool {
        match self.last_alert_at {
            None => true,
            Some(t) => t.elapsed().as_secs() >= self.cfg.alert_cooldown_seconds,
        }
    }

    /// Runs the configured restart hook exactly once per outage. A failure
    /// here only gets logged — there is nothing else to fall back to.
    fn attempt_restart(&self) {
        if self.cfg.restart_hook.is_empty() {
            return;
        }

        info!("invoking restart hook: {}", self.cfg.restart_hook);
        match Command::new("sh").arg("-c").arg(&self.cfg.restart_hook).status() {
            Ok(status) if status.success() => info!("restart hook completed successfully"),
            Ok(status) => warn!("restart hook exited with {status}"),
            Err(e) => warn!("failed to spawn restart hook: {e}"),
        }
    }
}
