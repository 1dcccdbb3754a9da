//! Sequential, time-bounded execution of a breaker's action list.

use super::{ActionCatalog, ActionContext, ConfirmationGateway, ConfirmationRequest};
use failsafe_domain::{ActionOutcome, ActionPriority, OutcomeStatus, TriggerKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Configuration for the action dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Dry run mode - log actions and report success without running them.
    pub dry_run: bool,
}

/// Runs remediation actions for tripped breakers.
///
/// Actions of one list run strictly in declared order. Every action is
/// bounded by `min(max_duration, priority ceiling)`; failures and timeouts
/// are recorded and the next action runs regardless.
pub struct ActionDispatcher {
    /// Registered actions.
    catalog: Arc<ActionCatalog>,
    /// Gateway for confirmation-gated actions.
    confirmations: Arc<dyn ConfirmationGateway>,
    /// Configuration.
    config: DispatcherConfig,
}

impl ActionDispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        catalog: Arc<ActionCatalog>,
        confirmations: Arc<dyn ConfirmationGateway>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            catalog,
            confirmations,
            config,
        }
    }

    /// Gets the action catalog.
    pub fn catalog(&self) -> &Arc<ActionCatalog> {
        &self.catalog
    }

    /// Runs `action_ids` in order and returns one outcome per action.
    ///
    /// `priority_override` replaces each action's own priority (manual trips
    /// run everything at [`ActionPriority::Critical`]).
    pub async fn dispatch(
        &self,
        breaker: &str,
        trigger: TriggerKind,
        action_ids: &[String],
        priority_override: Option<ActionPriority>,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(action_ids.len());

        for action_id in action_ids {
            let outcome = self
                .run_action(breaker, trigger, action_id, priority_override)
                .await;
            outcomes.push(outcome);
        }

        info!(
            breaker = breaker,
            total = outcomes.len(),
            succeeded = outcomes.iter().filter(|o| o.succeeded()).count(),
            "Action list completed"
        );

        outcomes
    }

    async fn run_action(
        &self,
        breaker: &str,
        trigger: TriggerKind,
        action_id: &str,
        priority_override: Option<ActionPriority>,
    ) -> ActionOutcome {
        let started = Instant::now();

        let Some(spec) = self.catalog.get(action_id) else {
            error!(breaker = breaker, action = action_id, "Action not registered");
            return ActionOutcome {
                action_id: action_id.to_string(),
                status: OutcomeStatus::Failed,
                priority: priority_override.unwrap_or(ActionPriority::Low),
                timeout: Duration::ZERO,
                duration: started.elapsed(),
                error: Some("action not registered".to_string()),
            };
        };

        let priority = priority_override.unwrap_or(spec.priority);
        let timeout = priority.effective_timeout(spec.max_duration());
        let finish = |status: OutcomeStatus, error: Option<String>| ActionOutcome {
            action_id: action_id.to_string(),
            status,
            priority,
            timeout,
            duration: started.elapsed(),
            error,
        };

        if spec.requires_confirmation {
            let request = ConfirmationRequest {
                breaker: breaker.to_string(),
                action_id: spec.id.clone(),
                action_name: spec.name.clone(),
                priority,
                timeout,
            };

            let denial = match tokio::time::timeout(timeout, self.confirmations.request(request))
                .await
            {
                Ok(Ok(true)) => None,
                Ok(Ok(false)) => Some("confirmation denied".to_string()),
                Ok(Err(e)) => Some(format!("confirmation unavailable: {}", e)),
                Err(_) => Some(format!("confirmation timed out after {:?}", timeout)),
            };

            if let Some(reason) = denial {
                warn!(breaker = breaker, action = action_id, reason = %reason, "Action not confirmed");
                return finish(OutcomeStatus::Failed, Some(reason));
            }
        }

        if self.config.dry_run {
            info!(breaker = breaker, action = action_id, priority = ?priority, "Would run action");
            return finish(OutcomeStatus::Succeeded, None);
        }

        let cancel = CancellationToken::new();
        let ctx = ActionContext {
            breaker: breaker.to_string(),
            trigger,
            action_id: spec.id.clone(),
            priority,
            timeout,
        };
        let procedure = spec.procedure.clone();
        let token = cancel.clone();
        let mut handle = tokio::spawn(async move { procedure.run(ctx, token).await });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                info!(breaker = breaker, action = action_id, "Action succeeded");
                finish(OutcomeStatus::Succeeded, None)
            }
            Ok(Ok(Err(e))) => {
                warn!(breaker = breaker, action = action_id, error = %e, "Action failed");
                finish(OutcomeStatus::Failed, Some(e.to_string()))
            }
            Ok(Err(e)) => {
                error!(breaker = breaker, action = action_id, error = %e, "Action panicked");
                finish(OutcomeStatus::Failed, Some(format!("procedure aborted: {}", e)))
            }
            Err(_) => {
                // Signal and move on; a procedure ignoring the token is not awaited.
                cancel.cancel();
                handle.abort();
                warn!(
                    breaker = breaker,
                    action = action_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Action timed out"
                );
                finish(
                    OutcomeStatus::TimedOut,
                    Some(format!("timed out after {:?}", timeout)),
                )
            }
        }
    }
}
