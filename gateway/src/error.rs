use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer did not match any known frame shape")]
    Unclassified,
    #[error("malformed binary TQ frame: {0}")]
    MalformedBinary(String),
    #[error("malformed NMEA frame: {0}")]
    MalformedNmea(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("UDP send failed: {0}")]
    Udp(#[from] std::io::Error),
    #[error("TCP mirror connect/write failed: {0}")]
    Mirror(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} had an invalid value {value:?}, using default")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier send failed: {0}")]
    Send(String),
}
