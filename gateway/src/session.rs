//! C4 — Session Manager.
//!
//! Accepts long-lived TCP connections from field devices, decodes each
//! buffer as it arrives, runs it through the quality filter, and fans
//! accepted reports out via [`crate::egress`]. Also owns the idle-session
//! sweeper and the fatal escalation path for when the listener itself dies
//! (§4.4), grounded in the legacy accept loop's `socket.error` handling.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::GatewayConfig;
use crate::egress::{self, MirrorSink};
use crate::filter::{QualityFilter, Verdict};
use crate::logs::{accepted_line, rejected_line, DailyLog};
use crate::notifier::Notifier;
use crate::types::{DecodeResult, LivenessCounters};

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_BUF_SIZE: usize = 1024;
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const SWEEP_IDLE_THRESHOLD: Duration = Duration::from_secs(600);

struct SessionHandle {
    last_activity: Instant,
    /// Last ShortId seen on this connection — from a registration frame or
    /// a decoded position report — used as the device-less fallback
    /// identifier for buffers that carry neither (§3).
    cached_short_id: Option<String>,
    /// Lets the sweeper forcibly tear down a half-open connection instead
    /// of only pruning its bookkeeping entry. `None` for the brief window
    /// between the entry being inserted and its task actually spawning.
    abort: Option<AbortHandle>,
}

pub struct SessionManager {
    cfg: Arc<GatewayConfig>,
    counters: Arc<LivenessCounters>,
    filter: Arc<Mutex<QualityFilter>>,
    sessions: Arc<Mutex<HashMap<u64, SessionHandle>>>,
    mirror: Option<MirrorSink>,
    log: Arc<DailyLog>,
    notifier: Arc<dyn Notifier>,
}

impl SessionManager {
    pub fn new(
        cfg: Arc<GatewayConfig>,
        counters: Arc<LivenessCounters>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mirror = if cfg.tcp_mirror_enabled {
            Some(egress::MirrorSink::spawn(cfg.clone(), 4))
        } else {
            None
        };
        Self {
            log: Arc::new(DailyLog::new(cfg.log_dir.clone())),
            cfg,
            counters,
            filter: Arc::new(Mutex::new(QualityFilter::new())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            mirror,
            notifier,
        }
    }

    /// Runs the accept loop until the listener itself fails, at which
    /// point it escalates via the notifier and returns. §4.4 treats a dead
    /// listener as the one truly fatal liveness condition.
    pub async fn run(self: Arc<Self>) {
        let listener = match TcpListener::bind(self.cfg.listen_addr()).await {
            Ok(l) => l,
            Err(e) => {
                self.notifier
                    .send(&format!("listening port {} failed to bind: {e}", self.cfg.listen_port))
                    .ok();
                return;
            }
        };
        info!("listening for TQ devices on {}", self.cfg.listen_addr());

        let mut next_id: u64 = 0;
        loop {
            match tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let session_id = next_id;
                    next_id += 1;
                    debug!(session_id, %addr, "accepted connection");

                    self.sessions.lock().await.insert(
                        session_id,
                        SessionHandle { last_activity: Instant::now(), cached_short_id: None, abort: None },
                    );
                    self.counters.active_sessions.fetch_add(1, Ordering::Relaxed);

                    let this = self.clone();
                    let join = tokio::spawn(async move {
                        this.handle_connection(session_id, stream).await;
                        this.finish_session(session_id).await;
                    });
                    if let Some(handle) = self.sessions.lock().await.get_mut(&session_id) {
                        handle.abort = Some(join.abort_handle());
                    }
                }
                Ok(Err(e)) => {
                    warn!("listening port closed unexpectedly: {e}");
                    self.notifier
                        .send(&format!("listening port {} closed: {e}", self.cfg.listen_port))
                        .ok();
                    return;
                }
                Err(_) => {
                    // Plain accept timeout; loop back around and try again.
                    continue;
                }
            }
        }
    }

    /// Background sweeper: every [`SWEEP_INTERVAL`], forcibly evicts
    /// sessions idle past [`SWEEP_IDLE_THRESHOLD`] — aborting the
    /// connection task (and its socket) rather than only pruning
    /// bookkeeping, so a half-open peer that never signals EOF is still
    /// reclaimed (§4.4).
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let stale: Vec<u64> = {
                let sessions = self.sessions.lock().await;
                sessions
                    .iter()
                    .filter(|(_, handle)| handle.last_activity.elapsed() >= SWEEP_IDLE_THRESHOLD)
                    .map(|(id, _)| *id)
                    .collect()
            };
            for session_id in stale {
                self.evict_session(session_id).await;
            }
        }
    }

    /// Removes a session's bookkeeping entry and, only if this call is the
    /// one that actually removed it, decrements the liveness counter. This
    /// guards against double-accounting when the sweeper and the
    /// connection's own completion race to clean up the same session.
    async fn finish_session(&self, session_id: u64) {
        if self.sessions.lock().await.remove(&session_id).is_some() {
            self.counters.active_sessions.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Forcibly tears down a session the sweeper judged stale: aborts its
    /// connection task (closing the socket) and accounts for it, guarded
    /// the same way as [`Self::finish_session`].
    async fn evict_session(&self, session_id: u64) {
        let removed = self.sessions.lock().await.remove(&session_id);
        if let Some(handle) = removed {
            if let Some(abort) = handle.abort {
                abort.abort();
            }
            self.counters.active_sessions.fetch_sub(1, Ordering::Relaxed);
            debug!(session_id, "swept stale session");
        }
    }

    async fn handle_connection(&self, session_id: u64, mut stream: TcpStream) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let read = tokio::time::timeout(IDLE_TIMEOUT, stream.read(&mut buf)).await;
            let n = match read {
                Ok(Ok(0)) => {
                    debug!(session_id, "connection closed by peer");
                    return;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!(session_id, "read error: {e}");
                    return;
                }
                Err(_) => {
                    debug!(session_id, "idle timeout, closing connection");
                    return;
                }
            };

            if let Some(handle) = self.sessions.lock().await.get_mut(&session_id) {
                handle.last_activity = Instant::now();
            }

            self.counters.total_messages.fetch_add(1, Ordering::Relaxed);
            self.process_buffer(session_id, &buf[..n]).await;
        }
    }

    async fn process_buffer(&self, session_id: u64, buf: &[u8]) {
        // Mirrored first, before decode/filter, so a raw copy goes out for
        // every received buffer — not only the ones that end up classified
        // or accepted (§4.3).
        if let Some(mirror) = &self.mirror {
            mirror.mirror(buf);
        }

        let decoded = codec::classify_and_decode(buf, &self.cfg, SystemTime::now());
        match decoded {
            DecodeResult::Frame(report) => {
                self.cache_short_id(session_id, report.short_id.clone()).await;

                let verdict = self.filter.lock().await.evaluate(&report, &self.cfg.filter);
                if verdict != Verdict::Accept {
                    self.log
                        .append(&rejected_line(&report.short_id, verdict.reason(), report.protocol_tag))
                        .await;
                    return;
                }

                let frame = codec::build_rpg_frame(&report, chrono::Utc::now());
                if let Err(e) = egress::send_to_platform(&self.cfg, &frame).await {
                    warn!("failed to send frame to platform: {e}");
                }
                self.log.append(&accepted_line(&report.short_id, &frame, report.protocol_tag)).await;
            }
            DecodeResult::Registration(short_id) => {
                self.cache_short_id(session_id, short_id.clone()).await;
                debug!(session_id, short_id, "registration frame acknowledged");
            }
            DecodeResult::Ignore(reason) => {
                let short_id = self.cached_short_id(session_id).await;
                debug!(session_id, short_id, "ignored buffer: {reason}");
            }
            DecodeResult::Error(e) => {
                let short_id = self.cached_short_id(session_id).await;
                debug!(session_id, short_id, "decode error: {e}");
            }
        }
    }

    async fn cache_short_id(&self, session_id: u64, short_id: String) {
        if let Some(handle) = self.sessions.lock().await.get_mut(&session_id) {
            handle.cached_short_id = Some(short_id);
        }
    }

    async fn cached_short_id(&self, session_id: u64) -> String {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .and_then(|handle| handle.cached_short_id.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
