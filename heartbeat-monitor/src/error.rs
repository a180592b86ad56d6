use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to bind heartbeat listener on {addr}: {source}")]
    Bind { addr: String, #[source] source: std::io::Error },
}
