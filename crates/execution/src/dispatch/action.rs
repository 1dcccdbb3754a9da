//! Remediation action registration.

use async_trait::async_trait;
use failsafe_domain::{ActionPriority, FailsafeError, FailsafeResult, TriggerKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Context handed to a remediation procedure.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Breaker that tripped.
    pub breaker: String,
    /// Why it tripped.
    pub trigger: TriggerKind,
    /// Action being run.
    pub action_id: String,
    /// Priority the action runs at.
    pub priority: ActionPriority,
    /// Effective timeout.
    pub timeout: Duration,
}

/// Embedder-supplied remediation logic.
///
/// Implementations should return promptly once `cancel` fires; the
/// dispatcher does not wait for them past their timeout.
#[async_trait]
pub trait RemediationProcedure: Send + Sync {
    /// Runs the procedure to completion or until cancelled.
    async fn run(&self, ctx: ActionContext, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Registered remediation action.
#[derive(Clone)]
pub struct ActionSpec {
    /// Identifier referenced by breaker configs.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Priority.
    pub priority: ActionPriority,
    /// Whether a human must approve before it runs.
    pub requires_confirmation: bool,
    /// Maximum execution time in seconds.
    pub max_duration_secs: u64,
    /// The procedure itself.
    pub procedure: Arc<dyn RemediationProcedure>,
}

impl ActionSpec {
    /// Creates an action that runs without confirmation.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        priority: ActionPriority,
        max_duration_secs: u64,
        procedure: Arc<dyn RemediationProcedure>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            requires_confirmation: false,
            max_duration_secs,
            procedure,
        }
    }

    /// Requires human confirmation before running.
    #[must_use]
    pub fn with_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    /// Configured maximum duration.
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("requires_confirmation", &self.requires_confirmation)
            .field("max_duration_secs", &self.max_duration_secs)
            .finish_non_exhaustive()
    }
}

/// Actions registered once at startup, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: HashMap<String, ActionSpec>,
}

impl ActionCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action.
    ///
    /// # Errors
    /// Returns [`FailsafeError::InvalidConfig`] for a duplicate or empty identifier
    /// or a zero duration.
    pub fn register(&mut self, spec: ActionSpec) -> FailsafeResult<()> {
        if spec.id.trim().is_empty() {
            return Err(FailsafeError::invalid_config("", "action identifier is empty"));
        }
        if spec.max_duration_secs == 0 {
            return Err(FailsafeError::invalid_config(
                "",
                format!("action '{}' has zero max duration", spec.id),
            ));
        }
        if self.actions.contains_key(&spec.id) {
            return Err(FailsafeError::invalid_config(
                "",
                format!("duplicate action '{}'", spec.id),
            ));
        }
        self.actions.insert(spec.id.clone(), spec);
        Ok(())
    }

    /// Builder-style [`ActionCatalog::register`].
    ///
    /// # Errors
    /// Same as [`ActionCatalog::register`].
    pub fn with(mut self, spec: ActionSpec) -> FailsafeResult<Self> {
        self.register(spec)?;
        Ok(self)
    }

    /// Looks up an action.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ActionSpec> {
        self.actions.get(id)
    }

    /// Whether an action is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Request for human sign-off on an action.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub breaker: String,
    pub action_id: String,
    pub action_name: String,
    pub priority: ActionPriority,
    /// How long the dispatcher will wait.
    pub timeout: Duration,
}

/// Gateway to whoever approves confirmation-gated actions.
#[async_trait]
pub trait ConfirmationGateway: Send + Sync {
    /// Returns `true` if the action was approved.
    async fn request(&self, request: ConfirmationRequest) -> anyhow::Result<bool>;
}

/// Gateway that rejects every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllConfirmations;

#[async_trait]
impl ConfirmationGateway for DenyAllConfirmations {
    async fn request(&self, _request: ConfirmationRequest) -> anyhow::Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl RemediationProcedure for Noop {
        async fn run(&self, _ctx: ActionContext, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let mut catalog = ActionCatalog::new();
        let spec = ActionSpec::new("halt", "Halt trading", ActionPriority::Critical, 5, Arc::new(Noop));

        assert!(catalog.register(spec.clone()).is_ok());
        assert!(matches!(
            catalog.register(spec),
            Err(FailsafeError::InvalidConfig { .. })
        ));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("halt"));
    }

    #[test]
    fn test_catalog_rejects_zero_duration() {
        let spec = ActionSpec::new("halt", "Halt trading", ActionPriority::Low, 0, Arc::new(Noop));
        assert!(ActionCatalog::new().with(spec).is_err());
    }
}
