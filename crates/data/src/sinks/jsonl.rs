//! Append-only JSON-lines audit sink.

use anyhow::Context;
use async_trait::async_trait;
use failsafe_domain::AuditRecord;
use failsafe_execution::audit::AuditSink;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Open log file plus whether the last write may have left a partial line.
struct LogFile {
    file: File,
    torn: bool,
}

/// Writes each audit record as one JSON document per line.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<LogFile>,
}

impl JsonlAuditSink {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open audit log {}", path.display()))?;

        info!(path = %path.display(), "Audit log opened");

        Ok(Self {
            path,
            file: Mutex::new(LogFile { file, torn: false }),
        })
    }

    /// Path of the audit log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record from a JSON-lines audit log.
    ///
    /// Lines that do not parse as a record are logged and skipped.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub async fn read_all(path: impl AsRef<Path>) -> anyhow::Result<Vec<AuditRecord>> {
        let file = File::open(path.as_ref()).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = line_no, error = %e, "Skipping unreadable audit record"),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let mut log = self.file.lock().await;
        let mut line = String::new();
        if log.torn {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(record)?);
        line.push('\n');

        log.torn = true;
        log.file.write_all(line.as_bytes()).await?;
        log.file.flush().await?;
        log.torn = false;

        debug!(kind = record.kind(), "Audit record written");
        Ok(())
    }
}
