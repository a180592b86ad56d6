//! C10 — Operator REPL.
//!
//! A tiny line-oriented console for whoever is sitting at the terminal
//! running the gateway in the foreground, mirroring the legacy tool's
//! interactive status commands.

use std::io::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::codec::xor_checksum;
use crate::config::GatewayConfig;
use crate::types::LivenessCounters;

pub async fn run(cfg: Arc<GatewayConfig>, counters: Arc<LivenessCounters>, started_at: SystemTime) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("tq> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(_) => break,
        };

        match line.trim() {
            "status" => print_status(&cfg, &counters, started_at),
            "clients" => {
                println!("active sessions: {}", counters.active_sessions.load(Ordering::Relaxed));
            }
            "terminal" => println!("listening on {}", cfg.listen_addr()),
            cmd if cmd.starts_with("checksum ") => {
                let body = &cmd["checksum ".len()..];
                println!("{:02X}", xor_checksum(body));
            }
            "quit" | "exit" => break,
            "" => {}
            other => println!("unknown command: {other:?} (try status, clients, terminal, checksum <frame>, quit)"),
        }
    }
}

fn print_status(cfg: &GatewayConfig, counters: &LivenessCounters, started_at: SystemTime) {
    let uptime = SystemTime::now().duration_since(started_at).map(|d| d.as_secs()).unwrap_or(0);
    println!(
        "listening={} udp_platform={} mirror={} messages={} clients={} uptime={}s",
        cfg.listen_addr(),
        cfg.udp_platform_addr(),
        if cfg.tcp_mirror_enabled { cfg.tcp_mirror_addr() } else { "disabled".to_string() },
        counters.total_messages.load(Ordering::Relaxed),
        counters.active_sessions.load(Ordering::Relaxed),
        uptime,
    );
}
