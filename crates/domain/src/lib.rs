//! Domain model for the fail-safe control core.
//!
//! Plain data shared by the breaker engine, the action dispatcher and the
//! emergency response coordinator:
//! - Breaker configuration, live state and point-in-time snapshots
//! - Trigger events, manual overrides and recovery records
//! - Action priorities and per-action outcomes
//! - Metrics snapshots fed to the evaluator
//! - Incident classification and records
//! - The error taxonomy surfaced to callers

/// Action outcomes.
pub mod action;
/// Audit records.
pub mod audit;
/// Breaker configuration and state.
pub mod breaker;
/// Shared enums.
pub mod enums;
/// Error types.
pub mod error;
/// Incident records.
pub mod incident;
/// Metrics snapshots.
pub mod metrics;

pub use action::{ActionOutcome, OutcomeStatus};
pub use audit::AuditRecord;
pub use breaker::{
    BreakerConfig, BreakerSnapshot, BreakerState, ManualOverrideRecord, RecoveryRecord,
    TriggerEvent,
};
pub use enums::{
    ActionPriority, BreakerLifecycle, ChannelKind, IncidentKind, Severity, Team, TriggerKind,
};
pub use error::{FailsafeError, FailsafeResult};
pub use incident::{
    IncidentDetails, IncidentRecord, NotificationAttempt, NotificationStatus, ProcedureOutcome,
};
pub use metrics::{MetricValue, MetricsSnapshot};
