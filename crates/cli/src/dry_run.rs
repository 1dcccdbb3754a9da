//! Stand-in collaborators that log instead of acting.

use async_trait::async_trait;
use failsafe_execution::dispatch::{
    ActionContext, ConfirmationGateway, ConfirmationRequest, RemediationProcedure,
};
use failsafe_execution::emergency::{IncidentContext, IncidentProcedure};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Remediation action that only logs.
pub struct DryRunAction;

#[async_trait]
impl RemediationProcedure for DryRunAction {
    async fn run(&self, ctx: ActionContext, _cancel: CancellationToken) -> anyhow::Result<()> {
        info!(
            breaker = %ctx.breaker,
            action = %ctx.action_id,
            priority = ?ctx.priority,
            timeout_secs = ctx.timeout.as_secs(),
            "Would run remediation action"
        );
        Ok(())
    }
}

/// Incident procedure that only logs.
pub struct DryRunProcedure {
    /// Procedure identifier.
    pub id: String,
}

#[async_trait]
impl IncidentProcedure for DryRunProcedure {
    async fn execute(&self, ctx: &IncidentContext) -> anyhow::Result<String> {
        info!(
            incident_id = %ctx.incident_id,
            procedure = %self.id,
            "Would run incident procedure"
        );
        Ok(format!("dry run: {}", self.id))
    }
}

/// Approves every confirmation request.
pub struct ApproveAll;

#[async_trait]
impl ConfirmationGateway for ApproveAll {
    async fn request(&self, request: ConfirmationRequest) -> anyhow::Result<bool> {
        info!(
            breaker = %request.breaker,
            action = %request.action_id,
            "Confirmation auto-approved"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe_domain::{IncidentDetails, IncidentKind, Severity};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_dry_run_procedure_reports_id() {
        let procedure = DryRunProcedure {
            id: "halt_trading".to_string(),
        };
        let ctx = IncidentContext {
            incident_id: Uuid::new_v4(),
            kind: IncidentKind::SystemFailure,
            severity: Severity::High,
            details: IncidentDetails::new("test"),
        };
        assert_eq!(
            procedure.execute(&ctx).await.unwrap(),
            "dry run: halt_trading"
        );
    }
}
