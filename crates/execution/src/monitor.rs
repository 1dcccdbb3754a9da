//! Periodic evaluation of breakers against a metrics source.

use crate::engine::CircuitBreakerEngine;
use async_trait::async_trait;
use failsafe_domain::{MetricsSnapshot, TriggerEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Produces metrics snapshots on demand.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Takes a snapshot of the current metrics.
    async fn snapshot(&self) -> anyhow::Result<MetricsSnapshot>;
}

/// Configuration for the evaluation loop.
#[derive(Debug, Clone)]
pub struct EvaluationLoopConfig {
    /// Evaluation interval in seconds.
    pub interval_secs: u64,
}

impl Default for EvaluationLoopConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

/// Polls a [`MetricsSource`] and feeds each snapshot to the engine.
pub struct EvaluationLoop {
    /// Engine to evaluate.
    engine: Arc<CircuitBreakerEngine>,
    /// Metrics source.
    source: Arc<dyn MetricsSource>,
    /// Configuration.
    config: EvaluationLoopConfig,
    /// Whether the loop is running.
    running: AtomicBool,
}

impl EvaluationLoop {
    /// Creates a new evaluation loop.
    pub fn new(
        engine: Arc<CircuitBreakerEngine>,
        source: Arc<dyn MetricsSource>,
        config: EvaluationLoopConfig,
    ) -> Self {
        Self {
            engine,
            source,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Runs until [`stop`](Self::stop) is called.
    pub async fn start(&self) {
        self.running.store(true, Ordering::SeqCst);

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));

        info!(
            interval_secs = self.config.interval_secs,
            "Starting evaluation loop"
        );

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                warn!(error = %e, "Metrics source failed, skipping evaluation");
            }
        }

        info!("Evaluation loop stopped");
    }

    /// Stops the loop after the current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Checks if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Takes one snapshot and evaluates it.
    ///
    /// # Errors
    /// Returns the metrics source error; evaluation itself never fails.
    pub async fn tick(&self) -> anyhow::Result<Vec<TriggerEvent>> {
        let snapshot = self.source.snapshot().await?;
        let events = self.engine.evaluate(&snapshot).await;
        debug!(tripped = events.len(), "Evaluation tick completed");
        Ok(events)
    }
}
