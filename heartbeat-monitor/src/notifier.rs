//! Same opaque escalation shape as the gateway's notifier — kept as its
//! own small trait here rather than a shared crate, since this is the
//! monitor's only dependency on the concept and a shared library would be
//! one more moving part for a single call site.

use tracing::{error, info};

pub trait Notifier: Send + Sync {
    fn down(&self, message: &str);
    fn recovered(&self, message: &str);
}

pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn down(&self, message: &str) {
        error!(target: "notifier", "[{}] {message}", chrono::Local::now().to_rfc3339());
    }

    fn recovered(&self, message: &str) {
        info!(target: "notifier", "[{}] {message}", chrono::Local::now().to_rfc3339());
    }
}
