//! C5 — Heartbeat Emitter.
//!
//! Periodically tells the companion monitor process that this gateway is
//! alive. Grounded in the legacy `send_heartbeat`/`heartbeat_loop` pair: a
//! fresh UDP socket per tick, a short send timeout, and failures logged at
//! debug only — the monitor being unreachable is routine, not an error.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::types::{HeartbeatDatagram, LivenessCounters};

const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs until `shutdown` resolves. Intended to be spawned as its own task.
pub async fn run(
    cfg: Arc<GatewayConfig>,
    counters: Arc<LivenessCounters>,
    server_id: String,
    started_at: SystemTime,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    if !cfg.heartbeat_enabled {
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.heartbeat_interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                send_once(&cfg, &counters, &server_id, started_at).await;
            }
            _ = shutdown.recv() => {
                debug!("heartbeat emitter shutting down");
                return;
            }
        }
    }
}

async fn send_once(cfg: &GatewayConfig, counters: &LivenessCounters, server_id: &str, started_at: SystemTime) {
    use std::sync::atomic::Ordering;

    let uptime_seconds = SystemTime::now()
        .duration_since(started_at)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let datagram = HeartbeatDatagram {
        timestamp: chrono::Utc::now().to_rfc3339(),
        server_id: server_id.to_string(),
        status: "running".to_string(),
        uptime_seconds,
        port: cfg.listen_port,
        clients: counters.active_sessions.load(Ordering::Relaxed),
        messages: counters.total_messages.load(Ordering::Relaxed),
    };

    let payload = match serde_json::to_vec(&datagram) {
        Ok(p) => p,
        Err(e) => {
            debug!("failed to encode heartbeat datagram: {e}");
            return;
        }
    };

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(e) => {
            debug!("heartbeat socket bind failed: {e}");
            return;
        }
    };

    let send = timeout(SEND_TIMEOUT, socket.send_to(&payload, cfg.heartbeat_addr())).await;
    match send {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!("heartbeat send failed (monitor may not be listening): {e}"),
        Err(_) => debug!("heartbeat send timed out (monitor may not be listening)"),
    }
}
