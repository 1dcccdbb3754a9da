//! Buffered audit trail in front of an append-only sink.

use async_trait::async_trait;
use failsafe_domain::AuditRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Durable append-only storage for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one record. Delivery is at-least-once.
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

/// Configuration for the audit trail.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Maximum records held while the sink is unavailable.
    pub buffer_capacity: usize,
    /// Upper bound on a single sink write in seconds.
    pub append_timeout_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            append_timeout_secs: 5,
        }
    }
}

/// Writes records to a sink, buffering them while the sink is down.
pub struct AuditTrail {
    /// Underlying sink.
    sink: Arc<dyn AuditSink>,
    /// Records not yet accepted by the sink, oldest first.
    pending: Mutex<VecDeque<AuditRecord>>,
    /// Configuration.
    config: AuditConfig,
}

impl AuditTrail {
    /// Creates a trail over `sink`.
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        Self {
            sink,
            pending: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Appends a record. Never fails; sink errors leave the record buffered.
    pub async fn append(&self, record: AuditRecord) {
        let mut pending = self.pending.lock().await;
        pending.push_back(record);
        self.drain(&mut pending).await;
    }

    /// Retries buffered records and returns how many remain.
    pub async fn flush(&self) -> usize {
        let mut pending = self.pending.lock().await;
        self.drain(&mut pending).await;
        pending.len()
    }

    /// Number of records waiting for the sink.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn drain(&self, pending: &mut VecDeque<AuditRecord>) {
        let timeout = Duration::from_secs(self.config.append_timeout_secs);

        while let Some(record) = pending.front() {
            match tokio::time::timeout(timeout, self.sink.append(record)).await {
                Ok(Ok(())) => {
                    debug!(kind = record.kind(), "Audit record written");
                    pending.pop_front();
                }
                Ok(Err(e)) => {
                    warn!(
                        kind = record.kind(),
                        buffered = pending.len(),
                        error = %e,
                        "Audit sink unavailable, buffering"
                    );
                    break;
                }
                Err(_) => {
                    warn!(
                        kind = record.kind(),
                        buffered = pending.len(),
                        timeout_secs = self.config.append_timeout_secs,
                        "Audit sink timed out, buffering"
                    );
                    break;
                }
            }
        }

        while pending.len() > self.config.buffer_capacity {
            if let Some(dropped) = pending.pop_front() {
                error!(
                    kind = dropped.kind(),
                    capacity = self.config.buffer_capacity,
                    "Audit buffer full, dropping oldest record"
                );
            }
        }
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(Arc::new(super::MemoryAuditSink::new()), AuditConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use chrono::Utc;

    fn revocation(name: &str) -> AuditRecord {
        AuditRecord::Revocation {
            breaker: name.to_string(),
            actor: "ops1".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_writes_through() {
        let sink = Arc::new(MemoryAuditSink::new());
        let trail = AuditTrail::new(sink.clone(), AuditConfig::default());

        trail.append(revocation("a")).await;

        assert_eq!(sink.records().await.len(), 1);
        assert_eq!(trail.pending().await, 0);
    }

    #[tokio::test]
    async fn test_buffers_while_sink_down() {
        let sink = Arc::new(MemoryAuditSink::new());
        let trail = AuditTrail::new(sink.clone(), AuditConfig::default());

        sink.set_available(false);
        trail.append(revocation("a")).await;
        trail.append(revocation("b")).await;
        assert_eq!(trail.pending().await, 2);
        assert!(sink.records().await.is_empty());

        sink.set_available(true);
        assert_eq!(trail.flush().await, 0);

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], AuditRecord::Revocation { breaker, .. } if breaker == "a"));
    }

    #[tokio::test]
    async fn test_buffer_drops_oldest_when_full() {
        let sink = Arc::new(MemoryAuditSink::new());
        let trail = AuditTrail::new(
            sink.clone(),
            AuditConfig {
                buffer_capacity: 2,
                ..Default::default()
            },
        );

        sink.set_available(false);
        for name in ["a", "b", "c"] {
            trail.append(revocation(name)).await;
        }
        assert_eq!(trail.pending().await, 2);

        sink.set_available(true);
        trail.flush().await;
        let records = sink.records().await;
        assert!(matches!(&records[0], AuditRecord::Revocation { breaker, .. } if breaker == "b"));
    }

    struct Stalled;

    #[async_trait]
    impl AuditSink for Stalled {
        async fn append(&self, _record: &AuditRecord) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_does_not_block_caller() {
        let trail = AuditTrail::new(Arc::new(Stalled), AuditConfig::default());

        let appended =
            tokio::time::timeout(Duration::from_secs(3600), trail.append(revocation("a"))).await;
        assert!(appended.is_ok());
        assert_eq!(trail.pending().await, 1);

        let remaining = tokio::time::timeout(Duration::from_secs(3600), trail.flush()).await;
        assert_eq!(remaining.ok(), Some(1));
    }
}
