//! Breaker configuration, live state and history records.

use crate::action::ActionOutcome;
use crate::enums::{BreakerLifecycle, TriggerKind};
use crate::error::{FailsafeError, FailsafeResult};
use crate::metrics::MetricsSnapshot;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest cooldown accepted at load time (7 days).
pub const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 60 * 60;

/// Operator-supplied breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Unique breaker name.
    pub name: String,
    /// Condition watched.
    pub trigger: TriggerKind,
    /// Value at or above which the breaker trips.
    pub threshold: Decimal,
    /// Evaluation window the metric refers to, in seconds.
    pub window_secs: u64,
    /// Time the breaker is left alone after a trip, in seconds.
    pub cooldown_secs: u64,
    /// Re-evaluate once the cooldown elapses and close if the condition cleared.
    #[serde(default)]
    pub auto_recovery: bool,
    /// Only a manual reset may close this breaker.
    #[serde(default)]
    pub manual_override_required: bool,
    /// Ordered action identifiers to run on trip.
    #[serde(default)]
    pub actions: Vec<String>,
}

impl BreakerConfig {
    /// Creates a config with no actions, no auto-recovery and no override requirement.
    pub fn new(
        name: impl Into<String>,
        trigger: TriggerKind,
        threshold: Decimal,
        window_secs: u64,
        cooldown_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            trigger,
            threshold,
            window_secs,
            cooldown_secs,
            auto_recovery: false,
            manual_override_required: false,
            actions: Vec::new(),
        }
    }

    /// Enables or disables auto-recovery.
    #[must_use]
    pub fn with_auto_recovery(mut self, enabled: bool) -> Self {
        self.auto_recovery = enabled;
        self
    }

    /// Requires a manual reset to close the breaker.
    #[must_use]
    pub fn with_manual_override_required(mut self, required: bool) -> Self {
        self.manual_override_required = required;
        self
    }

    /// Sets the ordered action list.
    #[must_use]
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the breaker may close without a manual reset.
    #[must_use]
    pub fn recovers_automatically(&self) -> bool {
        self.auto_recovery && !self.manual_override_required
    }

    /// Checks ranges that do not depend on other breakers or the action catalog.
    ///
    /// # Errors
    /// Returns [`FailsafeError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> FailsafeResult<()> {
        if self.name.trim().is_empty() {
            return Err(FailsafeError::invalid_config(&self.name, "name is empty"));
        }
        if self.threshold.is_sign_negative() {
            return Err(FailsafeError::invalid_config(
                &self.name,
                format!("threshold {} is negative", self.threshold),
            ));
        }
        if self.window_secs == 0 {
            return Err(FailsafeError::invalid_config(
                &self.name,
                "window must be positive",
            ));
        }
        if self.cooldown_secs == 0 {
            return Err(FailsafeError::invalid_config(
                &self.name,
                "cooldown must be positive",
            ));
        }
        if self.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(FailsafeError::invalid_config(
                &self.name,
                format!("cooldown {}s exceeds {}s", self.cooldown_secs, MAX_COOLDOWN_SECS),
            ));
        }
        if let Some(action) = self.actions.iter().find(|a| a.trim().is_empty()) {
            return Err(FailsafeError::invalid_config(
                &self.name,
                format!("empty action identifier '{}'", action),
            ));
        }
        Ok(())
    }
}

/// Operator override attached to a force-opened breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverrideRecord {
    /// Breaker the override applies to.
    pub breaker: String,
    /// Who tripped it.
    pub actor: String,
    /// Why.
    pub reason: String,
    /// When.
    pub timestamp: DateTime<Utc>,
}

/// Mutable per-breaker state, owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerState {
    /// Lifecycle state.
    pub lifecycle: BreakerLifecycle,
    /// Number of trips since load.
    pub trip_count: u64,
    /// Last trip time.
    pub last_trip_at: Option<DateTime<Utc>>,
    /// Set exactly while the breaker is inside its cooldown window.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Active manual override.
    pub manual_override: Option<ManualOverrideRecord>,
    /// Revoked breakers are kept for history but never evaluated.
    pub inert: bool,
    /// Outcomes of the most recent dispatch.
    pub last_outcomes: Vec<ActionOutcome>,
}

impl BreakerState {
    /// Initial closed state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: BreakerLifecycle::Closed,
            trip_count: 0,
            last_trip_at: None,
            cooldown_until: None,
            manual_override: None,
            inert: false,
            last_outcomes: Vec::new(),
        }
    }

    /// Whether the cooldown window is still running at `now`.
    #[must_use]
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Whether a manual reset would change anything.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.lifecycle == BreakerLifecycle::Closed
            && self.cooldown_until.is_none()
            && self.manual_override.is_none()
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only record of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event ID.
    pub id: Uuid,
    /// Breaker name.
    pub breaker: String,
    /// Trigger kind (manual for operator trips).
    pub trigger: TriggerKind,
    /// Configured threshold.
    pub threshold: Decimal,
    /// Observed value, absent for manual trips.
    pub observed: Option<Decimal>,
    /// Trip time.
    pub timestamp: DateTime<Utc>,
    /// Metrics that caused the trip.
    pub snapshot: Option<MetricsSnapshot>,
    /// Override recorded by a manual trip.
    pub manual_override: Option<ManualOverrideRecord>,
    /// Outcomes of the dispatched actions, in declared order.
    pub outcomes: Vec<ActionOutcome>,
}

impl TriggerEvent {
    /// Creates an event for an automatic trip.
    pub fn automatic(
        breaker: impl Into<String>,
        trigger: TriggerKind,
        threshold: Decimal,
        observed: Decimal,
        timestamp: DateTime<Utc>,
        snapshot: MetricsSnapshot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            breaker: breaker.into(),
            trigger,
            threshold,
            observed: Some(observed),
            timestamp,
            snapshot: Some(snapshot),
            manual_override: None,
            outcomes: Vec::new(),
        }
    }

    /// Creates an event for an operator trip.
    pub fn manual(threshold: Decimal, record: ManualOverrideRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            breaker: record.breaker.clone(),
            trigger: TriggerKind::Manual,
            threshold,
            observed: None,
            timestamp: record.timestamp,
            snapshot: None,
            manual_override: Some(record),
            outcomes: Vec::new(),
        }
    }

    /// Attaches the dispatch outcomes.
    #[must_use]
    pub fn with_outcomes(mut self, outcomes: Vec<ActionOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }
}

/// Note written when an operator resets a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub breaker: String,
    pub actor: String,
    pub previous: BreakerLifecycle,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// Trigger kind.
    pub trigger: TriggerKind,
    /// Lifecycle state.
    pub lifecycle: BreakerLifecycle,
    /// Trip count.
    pub trip_count: u64,
    /// Last trip time.
    pub last_trip_at: Option<DateTime<Utc>>,
    /// Cooldown expiry.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Whether the cooldown was still running when the snapshot was taken.
    pub in_cooldown: bool,
    /// Active override.
    pub manual_override: Option<ManualOverrideRecord>,
    /// Whether the breaker was revoked.
    pub inert: bool,
    /// Outcomes of the most recent dispatch.
    pub last_outcomes: Vec<ActionOutcome>,
}

impl BreakerSnapshot {
    /// Builds a snapshot from config and state at `now`.
    #[must_use]
    pub fn capture(config: &BreakerConfig, state: &BreakerState, now: DateTime<Utc>) -> Self {
        Self {
            name: config.name.clone(),
            trigger: config.trigger,
            lifecycle: state.lifecycle,
            trip_count: state.trip_count,
            last_trip_at: state.last_trip_at,
            cooldown_until: state.cooldown_until,
            in_cooldown: state.in_cooldown(now),
            manual_override: state.manual_override.clone(),
            inert: state.inert,
            last_outcomes: state.last_outcomes.clone(),
        }
    }
}
