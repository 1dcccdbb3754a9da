//! Remediation action outcomes.

use crate::enums::ActionPriority;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classification of a single action run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    /// Procedure completed.
    Succeeded,
    /// Procedure returned an error, panicked, or was not confirmed.
    Failed,
    /// Procedure exceeded its effective timeout.
    TimedOut,
}

/// Result of running one action for one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Action identifier.
    pub action_id: String,
    /// Classification.
    pub status: OutcomeStatus,
    /// Priority the action ran at.
    pub priority: ActionPriority,
    /// Effective timeout applied.
    pub timeout: Duration,
    /// Wall time spent, including any confirmation wait.
    pub duration: Duration,
    /// Error detail for failed or timed out actions.
    pub error: Option<String>,
}

impl ActionOutcome {
    /// Whether the action completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}
