//! In-memory audit sink.

use super::AuditSink;
use async_trait::async_trait;
use failsafe_domain::AuditRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Keeps every record in memory. Can be switched off to simulate an outage.
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    available: AtomicBool,
}

impl MemoryAuditSink {
    /// Creates an empty, available sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Makes subsequent appends succeed or fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// All records written so far.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            anyhow::bail!("memory audit sink unavailable");
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
