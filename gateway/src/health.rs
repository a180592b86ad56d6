//! C6 — Health Endpoint.
//!
//! A minimal axum server exposing `GET /health`. Access logging is
//! deliberately absent: the legacy handler suppressed it outright (every
//! poll would otherwise flood the log at multiple-times-per-minute), and
//! this port carries that behavior forward by simply never installing a
//! logging layer on this router.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::types::LivenessCounters;

#[derive(Clone)]
struct HealthState {
    counters: Arc<LivenessCounters>,
    started_at: SystemTime,
    server_id: String,
    port: u16,
}

pub async fn serve(
    bind_addr: String,
    health_port: u16,
    counters: Arc<LivenessCounters>,
    server_id: String,
    port: u16,
) -> std::io::Result<()> {
    let state = HealthState {
        counters,
        started_at: SystemTime::now(),
        server_id,
        port,
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .fallback(not_found)
        .with_state(state);

    let addr = format!("{bind_addr}:{health_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("health endpoint listening on {addr}");
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    use std::sync::atomic::Ordering;

    let uptime_seconds = state
        .started_at
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|_| SystemTime::now().duration_since(state.started_at).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "clients": state.counters.active_sessions.load(Ordering::Relaxed),
        "messages": state.counters.total_messages.load(Ordering::Relaxed),
        "terminal_id": state.server_id,
        "port": state.port,
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(json!({ "status": "not_found" })),
    )
}
