//! C8 — Daily Log Writer.
//!
//! Appends one line per accepted or rejected report to `logs/LOG_DDMMYY.txt`,
//! rolling to a new file at local-day boundaries. This is a plain append
//! log, not the chained-audit design the donor codebase uses elsewhere —
//! there is no tamper-evidence requirement here, just an operational trail.

use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::types::ProtocolTag;

pub struct DailyLog {
    dir: PathBuf,
}

impl DailyLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Appends one line, creating the directory and/or today's file as needed.
    /// Failures are logged and swallowed: a disk-full log writer must never
    /// take the gateway itself down.
    pub async fn append(&self, line: &str) {
        if let Err(e) = self.try_append(line).await {
            warn!("daily log write failed: {e}");
        }
    }

    async fn try_append(&self, line: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(self.current_file_name());

        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
        Ok(())
    }

    fn current_file_name(&self) -> String {
        format!("LOG_{}.txt", chrono::Local::now().format("%d%m%y"))
    }
}

fn timestamp_prefix() -> String {
    chrono::Local::now().format("%d/%m/%Y %H:%M:%S").to_string()
}

fn tag_prefix(tag: ProtocolTag) -> String {
    match tag.log_tag() {
        Some(tag) => format!("[{tag}] "),
        None => String::new(),
    }
}

/// Formats one accepted-report log line: timestamp, protocol tag, device,
/// coordinates, the re-encoded RPG frame that was sent downstream.
pub fn accepted_line(short_id: &str, frame: &str, tag: ProtocolTag) -> String {
    format!("{} {}ACCEPT {short_id} {frame}", timestamp_prefix(), tag_prefix(tag))
}

/// Formats one rejected-report log line for operator troubleshooting.
pub fn rejected_line(short_id: &str, reason: &str, tag: ProtocolTag) -> String {
    format!("{} {}REJECT {short_id} {reason}", timestamp_prefix(), tag_prefix(tag))
}
