mod codec;
mod config;
mod egress;
mod error;
mod filter;
mod health;
mod heartbeat;
mod logs;
mod notifier;
mod repl;
mod session;
mod types;

use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use tracing::info;

use config::GatewayConfig;
use notifier::LoggingNotifier;
use session::SessionManager;
use types::LivenessCounters;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "tq_gateway=info".into()),
        )
        .init();

    let started_at = SystemTime::now();
    let cfg = Arc::new(GatewayConfig::default());
    let server_id = "tq_gateway".to_string();

    info!(
        "TQ gateway v{} starting — listen={} udp_platform={} mirror_enabled={}",
        env!("CARGO_PKG_VERSION"),
        cfg.listen_addr(),
        cfg.udp_platform_addr(),
        cfg.tcp_mirror_enabled,
    );

    let counters = Arc::new(LivenessCounters::default());
    let notifier: Arc<dyn notifier::Notifier> = Arc::new(LoggingNotifier);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let manager = Arc::new(SessionManager::new(cfg.clone(), counters.clone(), notifier.clone()));
    tokio::spawn(manager.clone().run());
    tokio::spawn(manager.run_sweeper());

    tokio::spawn(heartbeat::run(
        cfg.clone(),
        counters.clone(),
        server_id.clone(),
        started_at,
        shutdown_tx.subscribe(),
    ));

    let health_cfg = cfg.clone();
    let health_counters = counters.clone();
    let health_server_id = server_id.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(
            health_cfg.listen_host.clone(),
            health_cfg.health_port,
            health_counters,
            health_server_id,
            health_cfg.listen_port,
        )
        .await
        {
            tracing::error!("health endpoint failed: {e}");
        }
    });

    let daemon = std::env::args().any(|a| a == "--daemon");
    if daemon {
        // No operator console in daemon mode; just wait for a shutdown signal.
        tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    } else {
        repl::run(cfg.clone(), counters.clone(), started_at).await;
    }

    info!("shutting down");
    notifier.send("service stopped").ok();
    let _ = shutdown_tx.send(());
    Ok(())
}
