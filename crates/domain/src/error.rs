//! Error taxonomy for the fail-safe control core.

use thiserror::Error;

/// Errors surfaced to callers of the breaker engine.
///
/// Per-action timeouts and failures are deliberately absent: they are
/// captured in [`crate::action::ActionOutcome`] records and never returned
/// as errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailsafeError {
    /// The named breaker is not registered.
    #[error("unknown breaker: {0}")]
    UnknownBreaker(String),
    /// A breaker configuration was rejected at load time.
    #[error("invalid config for breaker '{breaker}': {reason}")]
    InvalidConfig {
        /// Breaker name (may be empty when the name itself is invalid).
        breaker: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The actor is not authorized for the manual operation.
    #[error("permission denied: '{actor}' may not {operation} breaker '{breaker}'")]
    PermissionDenied {
        /// Actor identity.
        actor: String,
        /// Operation attempted.
        operation: String,
        /// Target breaker.
        breaker: String,
    },
}

impl FailsafeError {
    /// Builds an [`FailsafeError::InvalidConfig`].
    pub fn invalid_config(breaker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            breaker: breaker.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for fallible engine operations.
pub type FailsafeResult<T> = Result<T, FailsafeError>;
