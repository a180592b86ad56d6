//! C3 — Egress Fan-out.
//!
//! Every accepted [`PositionReport`] is re-encoded to RPG and sent two ways:
//! a best-effort UDP datagram to the tracking platform, and a mirrored copy
//! of the original raw bytes to a redundant TCP sink. The UDP path is
//! synchronous and cheap; the TCP path is offloaded to a bounded worker
//! pool so a slow or dead mirror can never back-pressure message intake.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::SinkError;

const UDP_SEND_TIMEOUT: Duration = Duration::from_secs(3);
const MIRROR_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const MIRROR_SEND_TIMEOUT: Duration = Duration::from_secs(2);
const MIRROR_QUEUE_DEPTH: usize = 256;

/// Sends one RPG ASCII frame to the tracking platform over UDP. A fresh
/// ephemeral socket per call keeps this path stateless and free of any
/// lingering connection the platform would need to keep alive.
pub async fn send_to_platform(cfg: &GatewayConfig, frame: &str) -> Result<(), SinkError> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    timeout(UDP_SEND_TIMEOUT, socket.send_to(frame.as_bytes(), cfg.udp_platform_addr()))
        .await
        .map_err(|_| SinkError::Mirror("UDP send timed out".to_string()))??;
    Ok(())
}

struct MirrorQueue {
    items: StdMutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

/// Handle to the mirror worker pool. Cloning is cheap; every clone shares
/// the same bounded queue into the workers.
#[derive(Clone)]
pub struct MirrorSink {
    queue: Arc<MirrorQueue>,
}

impl MirrorSink {
    /// Spawns `worker_count` tasks, each owning its own TCP connection to
    /// the mirror host, draining a shared bounded queue. The queue is
    /// drop-oldest: once at capacity, enqueuing a new frame evicts the
    /// longest-queued one rather than stall the session loop that produced
    /// it (§4.3).
    pub fn spawn(cfg: Arc<GatewayConfig>, worker_count: usize) -> Self {
        let queue = Arc::new(MirrorQueue {
            items: StdMutex::new(VecDeque::with_capacity(MIRROR_QUEUE_DEPTH)),
            notify: Notify::new(),
        });

        for worker_id in 0..worker_count.max(1) {
            let cfg = cfg.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                loop {
                    let message = queue.items.lock().unwrap().pop_front();
                    let Some(message) = message else {
                        queue.notify.notified().await;
                        continue;
                    };
                    if let Err(e) = mirror_once(&cfg, &message).await {
                        debug!(worker_id, "mirror send failed: {e}");
                    }
                }
            });
        }

        Self { queue }
    }

    /// Enqueues raw bytes for mirroring. When the queue is already at
    /// capacity, evicts the oldest queued frame to make room rather than
    /// applying back-pressure on the caller.
    pub fn mirror(&self, raw: &[u8]) {
        let mut items = self.queue.items.lock().unwrap();
        if items.len() >= MIRROR_QUEUE_DEPTH {
            items.pop_front();
            warn!("mirror queue full, dropping oldest frame");
        }
        items.push_back(raw.to_vec());
        drop(items);
        self.queue.notify.notify_one();
    }
}

async fn mirror_once(cfg: &GatewayConfig, raw: &[u8]) -> Result<(), SinkError> {
    let mut stream = timeout(MIRROR_CONNECT_TIMEOUT, TcpStream::connect(cfg.tcp_mirror_addr()))
        .await
        .map_err(|_| SinkError::Mirror("connect timed out".to_string()))?
        .map_err(|e| SinkError::Mirror(e.to_string()))?;

    use tokio::io::AsyncWriteExt;
    timeout(MIRROR_SEND_TIMEOUT, stream.write_all(raw))
        .await
        .map_err(|_| SinkError::Mirror("write timed out".to_string()))?
        .map_err(|e| SinkError::Mirror(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_sink_clone_shares_one_queue() {
        let cfg = Arc::new(GatewayConfig {
            tcp_mirror_port: 0, // unreachable; we only test the queue, not delivery
            ..GatewayConfig::default()
        });
        let sink = MirrorSink::spawn(cfg, 1);
        let sink2 = sink.clone();
        sink.mirror(b"frame-a");
        sink2.mirror(b"frame-b");
    }

    #[test]
    fn mirror_evicts_oldest_when_queue_is_full() {
        let cfg = Arc::new(GatewayConfig {
            tcp_mirror_port: 0, // unreachable; no worker drains this queue in the test
            ..GatewayConfig::default()
        });
        let queue = Arc::new(MirrorQueue {
            items: StdMutex::new(VecDeque::with_capacity(2)),
            notify: Notify::new(),
        });
        let sink = MirrorSink { queue: queue.clone() };
        let _ = &cfg;

        for i in 0..MIRROR_QUEUE_DEPTH {
            sink.mirror(format!("frame-{i}").as_bytes());
        }
        // One more push past capacity must evict the oldest (frame-0), not
        // the newest.
        sink.mirror(b"frame-overflow");

        let items = queue.items.lock().unwrap();
        assert_eq!(items.len(), MIRROR_QUEUE_DEPTH);
        assert_eq!(items.front().unwrap(), b"frame-1");
        assert_eq!(items.back().unwrap(), b"frame-overflow");
    }
}
