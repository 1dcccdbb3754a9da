//! Records written to the audit sink.

use crate::breaker::{ManualOverrideRecord, RecoveryRecord, TriggerEvent};
use crate::incident::IncidentRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Any record the core appends to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Trigger(TriggerEvent),
    ManualOverride(ManualOverrideRecord),
    Recovery(RecoveryRecord),
    Revocation {
        breaker: String,
        actor: String,
        timestamp: DateTime<Utc>,
    },
    Incident(Box<IncidentRecord>),
}

impl AuditRecord {
    /// Short type name, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::ManualOverride(_) => "manual_override",
            Self::Recovery(_) => "recovery",
            Self::Revocation { .. } => "revocation",
            Self::Incident(_) => "incident",
        }
    }
}
