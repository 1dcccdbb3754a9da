//! Incident records produced by the emergency coordinator.

use crate::enums::{ChannelKind, IncidentKind, Severity, Team};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Caller-supplied description of an incident.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentDetails {
    /// Human-readable summary.
    pub summary: String,
    /// Loss as a fraction of equity, for trading loss incidents.
    #[serde(default)]
    pub loss_pct: Option<Decimal>,
    /// Breaker that escalated the incident, if any.
    #[serde(default)]
    pub breaker: Option<String>,
    /// Free-form context.
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl IncidentDetails {
    /// Creates details with a summary.
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Sets the loss fraction.
    #[must_use]
    pub fn with_loss_pct(mut self, loss_pct: Decimal) -> Self {
        self.loss_pct = Some(loss_pct);
        self
    }

    /// Sets the originating breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: impl Into<String>) -> Self {
        self.breaker = Some(breaker.into());
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Result of one remediation procedure run for an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureOutcome {
    /// Procedure identifier.
    pub procedure: String,
    /// Whether it completed.
    pub succeeded: bool,
    /// Summary returned by the procedure or error detail.
    pub detail: String,
    /// Wall time spent.
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Delivered,
    Failed,
    /// Skipped because the same contact was told about the same kind recently.
    Suppressed,
}

/// One attempt to reach one contact over one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub contact: String,
    pub channel: ChannelKind,
    pub status: NotificationStatus,
    pub error: Option<String>,
}

/// Documented record of a handled incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Incident ID.
    pub id: Uuid,
    /// Classification.
    pub kind: IncidentKind,
    /// Severity.
    pub severity: Severity,
    /// Caller-supplied details.
    pub details: IncidentDetails,
    /// Teams engaged.
    pub teams: Vec<Team>,
    /// Name of the procedure set that ran.
    pub procedure_set: String,
    /// When handling started.
    pub opened_at: DateTime<Utc>,
    /// When handling finished.
    pub finalized_at: DateTime<Utc>,
    /// Procedures run, in plan order.
    pub actions_taken: Vec<ProcedureOutcome>,
    /// Notification attempts.
    pub notifications: Vec<NotificationAttempt>,
    /// Filled in by a human after the fact.
    pub resolution: Option<String>,
    /// Filled in by a human after the fact.
    pub lessons_learned: Option<String>,
}

impl IncidentRecord {
    /// Number of procedures that did not complete.
    #[must_use]
    pub fn failed_actions(&self) -> usize {
        self.actions_taken.iter().filter(|a| !a.succeeded).count()
    }

    /// Number of notifications delivered.
    #[must_use]
    pub fn delivered_notifications(&self) -> usize {
        self.notifications
            .iter()
            .filter(|n| n.status == NotificationStatus::Delivered)
            .count()
    }
}
