mod config;
mod error;
mod monitor;
mod notifier;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use config::MonitorConfig;
use monitor::Monitor;
use notifier::LoggingNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "heartbeat_monitor=info".into()),
        )
        .init();

    let cfg = MonitorConfig::default();
    info!(
        "heartbeat monitor starting — listen={} timeout={}s cooldown={}s",
        cfg.listen_addr(),
        cfg.timeout_seconds,
        cfg.alert_cooldown_seconds,
    );

    let notifier: Arc<dyn notifier::Notifier> = Arc::new(LoggingNotifier);
    let monitor = Monitor::new(cfg, notifier);

    monitor.run().await.context("heartbeat monitor loop failed")?;
    Ok(())
}
