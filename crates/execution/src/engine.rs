//! Circuit breaker engine: the externally visible control surface.
//!
//! Composes the breaker registry and the action dispatcher, gates manual
//! operations through an [`Authorizer`] and escalates severe trips to the
//! [`EmergencyCoordinator`].

use crate::audit::AuditTrail;
use crate::auth::{AllowAll, Authorizer, ManualOperation};
use crate::breaker::BreakerRegistry;
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{
    ActionCatalog, ActionDispatcher, ConfirmationGateway, DenyAllConfirmations, DispatcherConfig,
};
use crate::emergency::{EmergencyCoordinator, EscalationPolicy};
use failsafe_domain::{
    BreakerConfig, BreakerSnapshot, FailsafeError, FailsafeResult, IncidentRecord,
    MetricsSnapshot, RecoveryRecord, TriggerEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Builder for [`CircuitBreakerEngine`].
pub struct CircuitBreakerEngineBuilder {
    breakers: Vec<BreakerConfig>,
    catalog: ActionCatalog,
    confirmations: Option<Arc<dyn ConfirmationGateway>>,
    dispatcher_config: DispatcherConfig,
    audit: Option<Arc<AuditTrail>>,
    clock: Option<Arc<dyn Clock>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    coordinator: Option<Arc<EmergencyCoordinator>>,
    policy: EscalationPolicy,
}

impl CircuitBreakerEngineBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            breakers: Vec::new(),
            catalog: ActionCatalog::new(),
            confirmations: None,
            dispatcher_config: DispatcherConfig::default(),
            audit: None,
            clock: None,
            authorizer: None,
            coordinator: None,
            policy: EscalationPolicy::default(),
        }
    }

    /// Adds a breaker configuration.
    pub fn add_breaker(mut self, config: BreakerConfig) -> Self {
        self.breakers.push(config);
        self
    }

    /// Adds several breaker configurations.
    pub fn with_breakers(mut self, configs: impl IntoIterator<Item = BreakerConfig>) -> Self {
        self.breakers.extend(configs);
        self
    }

    /// Sets the action catalog.
    pub fn with_catalog(mut self, catalog: ActionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the confirmation gateway. Without one, confirmation-gated actions fail.
    pub fn with_confirmations(mut self, gateway: Arc<dyn ConfirmationGateway>) -> Self {
        self.confirmations = Some(gateway);
        self
    }

    /// Sets the dispatcher configuration.
    pub fn with_dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher_config = config;
        self
    }

    /// Sets the audit trail.
    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Sets the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the authorizer for manual operations.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Sets the emergency coordinator trips escalate to.
    pub fn with_coordinator(mut self, coordinator: Arc<EmergencyCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Sets the escalation policy.
    pub fn with_escalation_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    /// Returns [`FailsafeError::InvalidConfig`] if any breaker config is
    /// malformed or names an unregistered action.
    pub fn build(self) -> FailsafeResult<CircuitBreakerEngine> {
        let audit = self.audit.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let dispatcher = Arc::new(ActionDispatcher::new(
            Arc::new(self.catalog),
            self.confirmations
                .unwrap_or_else(|| Arc::new(DenyAllConfirmations)),
            self.dispatcher_config,
        ));
        let registry = BreakerRegistry::load(self.breakers, dispatcher, audit.clone(), clock)?;

        Ok(CircuitBreakerEngine {
            registry: Arc::new(registry),
            authorizer: self.authorizer.unwrap_or_else(|| Arc::new(AllowAll)),
            coordinator: self.coordinator,
            policy: self.policy,
            audit,
            escalations: Mutex::new(JoinSet::new()),
        })
    }
}

impl Default for CircuitBreakerEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Circuit breaker engine.
pub struct CircuitBreakerEngine {
    /// Breakers and their state.
    registry: Arc<BreakerRegistry>,
    /// Gate for manual operations.
    authorizer: Arc<dyn Authorizer>,
    /// Incident handling, if configured.
    coordinator: Option<Arc<EmergencyCoordinator>>,
    /// Which trips become incidents.
    policy: EscalationPolicy,
    /// Audit trail.
    audit: Arc<AuditTrail>,
    /// Escalations spawned by `evaluate`.
    escalations: Mutex<JoinSet<Vec<IncidentRecord>>>,
}

impl CircuitBreakerEngine {
    /// Creates a new builder.
    pub fn builder() -> CircuitBreakerEngineBuilder {
        CircuitBreakerEngineBuilder::new()
    }

    /// Evaluates every breaker against `snapshot` and returns the new trips.
    ///
    /// With auto-escalation on and a coordinator configured, qualifying trips
    /// are escalated in the background.
    pub async fn evaluate(&self, snapshot: &MetricsSnapshot) -> Vec<TriggerEvent> {
        let events = self.registry.evaluate(snapshot).await;

        if self.policy.auto_escalate && !events.is_empty() {
            if let Some(coordinator) = &self.coordinator {
                let coordinator = coordinator.clone();
                let policy = self.policy;
                let batch = events.clone();

                let mut escalations = self.escalations.lock().await;
                while let Some(done) = escalations.try_join_next() {
                    if let Err(e) = done {
                        error!(error = %e, "Escalation task failed");
                    }
                }
                escalations.spawn(async move { escalate_with(&coordinator, policy, &batch).await });
            }
        }

        events
    }

    /// Escalates qualifying trips and waits for their incidents.
    ///
    /// Returns nothing when no coordinator is configured.
    pub async fn escalate(&self, events: &[TriggerEvent]) -> Vec<IncidentRecord> {
        match &self.coordinator {
            Some(coordinator) => escalate_with(coordinator, self.policy, events).await,
            None => {
                warn!("No emergency coordinator configured, escalation skipped");
                Vec::new()
            }
        }
    }

    /// Waits for escalations spawned by `evaluate` and returns their incidents.
    pub async fn wait_for_escalations(&self) -> Vec<IncidentRecord> {
        let mut escalations = self.escalations.lock().await;
        let mut incidents = Vec::new();
        while let Some(done) = escalations.join_next().await {
            match done {
                Ok(records) => incidents.extend(records),
                Err(e) => error!(error = %e, "Escalation task failed"),
            }
        }
        incidents
    }

    /// Forces a breaker open on behalf of `actor`.
    ///
    /// # Errors
    /// Returns [`FailsafeError::UnknownBreaker`] or
    /// [`FailsafeError::PermissionDenied`].
    pub async fn manual_trip(
        &self,
        name: &str,
        actor: &str,
        reason: &str,
    ) -> FailsafeResult<TriggerEvent> {
        self.authorize(name, actor, ManualOperation::Trip).await?;
        self.registry.manual_trip(name, actor, reason).await
    }

    /// Closes a breaker on behalf of `actor`.
    ///
    /// Returns `Ok(None)` if the breaker had nothing to reset.
    ///
    /// # Errors
    /// Returns [`FailsafeError::UnknownBreaker`] or
    /// [`FailsafeError::PermissionDenied`].
    pub async fn manual_reset(
        &self,
        name: &str,
        actor: &str,
    ) -> FailsafeResult<Option<RecoveryRecord>> {
        self.authorize(name, actor, ManualOperation::Reset).await?;
        self.registry.manual_reset(name, actor).await
    }

    /// Takes a breaker out of evaluation permanently. Requires reset rights.
    ///
    /// # Errors
    /// Returns [`FailsafeError::UnknownBreaker`] or
    /// [`FailsafeError::PermissionDenied`].
    pub async fn revoke(&self, name: &str, actor: &str) -> FailsafeResult<()> {
        self.authorize(name, actor, ManualOperation::Reset).await?;
        self.registry.revoke(name, actor).await
    }

    /// Point-in-time view of every breaker.
    pub async fn status(&self) -> Vec<BreakerSnapshot> {
        self.registry.status().await
    }

    /// Gets the breaker registry.
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Gets the emergency coordinator.
    pub fn coordinator(&self) -> Option<&Arc<EmergencyCoordinator>> {
        self.coordinator.as_ref()
    }

    /// Gets the audit trail.
    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    async fn authorize(
        &self,
        name: &str,
        actor: &str,
        operation: ManualOperation,
    ) -> FailsafeResult<()> {
        if !self.registry.contains(name) {
            return Err(FailsafeError::UnknownBreaker(name.to_string()));
        }

        if !self.authorizer.authorize(actor, operation, name).await {
            warn!(
                breaker = name,
                actor = actor,
                operation = %operation,
                "Manual operation denied"
            );
            return Err(FailsafeError::PermissionDenied {
                actor: actor.to_string(),
                operation: operation.to_string(),
                breaker: name.to_string(),
            });
        }

        Ok(())
    }
}

async fn escalate_with(
    coordinator: &EmergencyCoordinator,
    policy: EscalationPolicy,
    events: &[TriggerEvent],
) -> Vec<IncidentRecord> {
    let mut incidents = Vec::new();
    for event in events {
        let Some((kind, severity, details)) = policy.incident_for(event) else {
            continue;
        };
        info!(
            breaker = %event.breaker,
            kind = %kind,
            severity = %severity,
            "Escalating breaker trip"
        );
        incidents.push(coordinator.handle_incident(kind, severity, details).await);
    }
    incidents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditConfig, MemoryAuditSink};
    use crate::auth::{Role, RoleAuthorizer};
    use crate::clock::ManualClock;
    use crate::dispatch::{ActionContext, ActionSpec, RemediationProcedure};
    use crate::emergency::CoordinatorConfig;
    use async_trait::async_trait;
    use failsafe_domain::metrics::fields;
    use failsafe_domain::{
        ActionPriority, AuditRecord, BreakerLifecycle, IncidentKind, OutcomeStatus, TriggerKind,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Noop;

    #[async_trait]
    impl RemediationProcedure for Noop {
        async fn run(&self, _ctx: ActionContext, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        engine: CircuitBreakerEngine,
        clock: Arc<ManualClock>,
        sink: Arc<MemoryAuditSink>,
    }

    fn catalog() -> ActionCatalog {
        ActionCatalog::new()
            .with(ActionSpec::new(
                "reducePositions",
                "Reduce positions",
                ActionPriority::High,
                25,
                Arc::new(Noop),
            ))
            .unwrap()
            .with(ActionSpec::new(
                "cancelNewOrders",
                "Cancel new orders",
                ActionPriority::Medium,
                60,
                Arc::new(Noop),
            ))
            .unwrap()
    }

    fn daily_loss() -> BreakerConfig {
        BreakerConfig::new(
            "dailyLoss",
            TriggerKind::LossThreshold,
            dec!(0.05),
            86_400,
            1_800,
        )
        .with_auto_recovery(true)
        .with_actions(["reducePositions", "cancelNewOrders"])
    }

    fn harness(with_coordinator: bool) -> Harness {
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Arc::new(AuditTrail::new(sink.clone(), AuditConfig::default()));
        let clock = Arc::new(ManualClock::default());
        let authorizer = RoleAuthorizer::new()
            .grant("ops1", Role::Operator)
            .grant("lead", Role::Admin);

        let mut builder = CircuitBreakerEngine::builder()
            .add_breaker(daily_loss())
            .with_catalog(catalog())
            .with_audit(audit.clone())
            .with_clock(clock.clone())
            .with_authorizer(Arc::new(authorizer));

        if with_coordinator {
            let coordinator =
                EmergencyCoordinator::new(CoordinatorConfig::default(), audit, clock.clone());
            builder = builder.with_coordinator(Arc::new(coordinator));
        }

        Harness {
            engine: builder.build().unwrap(),
            clock,
            sink,
        }
    }

    fn loss(value: Decimal) -> MetricsSnapshot {
        MetricsSnapshot::new().with_number(fields::DAILY_LOSS_RATIO, value)
    }

    #[tokio::test]
    async fn test_daily_loss_lifecycle() {
        let h = harness(false);

        let events = h.engine.evaluate(&loss(dec!(0.06))).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].observed, Some(dec!(0.06)));
        assert_eq!(events[0].outcomes.len(), 2);

        let status = h.engine.status().await;
        assert_eq!(status[0].lifecycle, BreakerLifecycle::Open);
        assert_eq!(status[0].trip_count, 1);
        assert!(status[0].in_cooldown);

        h.clock.advance(chrono::Duration::minutes(5));
        assert!(h.engine.evaluate(&loss(dec!(0.02))).await.is_empty());
        assert_eq!(h.engine.status().await[0].lifecycle, BreakerLifecycle::Open);

        h.clock.advance(chrono::Duration::minutes(26));
        assert!(h.engine.evaluate(&loss(dec!(0.01))).await.is_empty());
        let status = h.engine.status().await;
        assert_eq!(status[0].lifecycle, BreakerLifecycle::Closed);
        assert_eq!(status[0].trip_count, 1);
        assert!(status[0].cooldown_until.is_none());
    }

    #[tokio::test]
    async fn test_manual_trip_runs_critical() {
        let h = harness(false);

        let event = h
            .engine
            .manual_trip("dailyLoss", "ops1", "suspicious fills")
            .await
            .unwrap();

        let status = h.engine.status().await;
        assert_eq!(status[0].lifecycle, BreakerLifecycle::ForcedOpen);
        assert_eq!(
            status[0].manual_override.as_ref().map(|o| o.actor.as_str()),
            Some("ops1")
        );
        assert_eq!(event.trigger, TriggerKind::Manual);
        assert_eq!(event.outcomes.len(), 2);
        for outcome in &event.outcomes {
            assert_eq!(outcome.priority, ActionPriority::Critical);
            assert!(outcome.timeout <= Duration::from_secs(10));
            assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        }

        // Forced open breakers ignore metrics until reset.
        assert!(h.engine.evaluate(&loss(dec!(0.50))).await.is_empty());

        let record = h.engine.manual_reset("dailyLoss", "lead").await.unwrap();
        assert_eq!(
            record.map(|r| r.previous),
            Some(BreakerLifecycle::ForcedOpen)
        );
        assert_eq!(
            h.engine.status().await[0].lifecycle,
            BreakerLifecycle::Closed
        );

        let kinds: Vec<&str> = h.sink.records().await.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec!["manual_override", "trigger", "recovery"]);
    }

    #[tokio::test]
    async fn test_permission_and_unknown_breaker() {
        let h = harness(false);

        let err = h
            .engine
            .manual_reset("dailyLoss", "ops1")
            .await
            .unwrap_err();
        assert!(matches!(err, FailsafeError::PermissionDenied { .. }));

        let err = h
            .engine
            .manual_trip("dailyLoss", "intruder", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, FailsafeError::PermissionDenied { .. }));
        assert_eq!(h.engine.status().await[0].lifecycle, BreakerLifecycle::Closed);

        let err = h
            .engine
            .manual_trip("weeklyLoss", "intruder", "x")
            .await
            .unwrap_err();
        assert_eq!(err, FailsafeError::UnknownBreaker("weeklyLoss".to_string()));

        assert!(h.sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_of_closed_breaker_is_noop() {
        let h = harness(false);
        assert!(
            h.engine
                .manual_reset("dailyLoss", "lead")
                .await
                .unwrap()
                .is_none()
        );
        assert!(h.sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_trip_escalates_to_trading_loss_incident() {
        let h = harness(true);

        let events = h.engine.evaluate(&loss(dec!(0.06))).await;
        assert_eq!(events.len(), 1);

        let incidents = h.engine.wait_for_escalations().await;
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, IncidentKind::TradingLoss);
        assert_eq!(incidents[0].procedure_set, "trading_loss_aggressive");
        assert_eq!(incidents[0].details.breaker.as_deref(), Some("dailyLoss"));

        let coordinator = h.engine.coordinator().unwrap();
        assert_eq!(coordinator.incidents().await.len(), 1);
        assert!(
            h.sink
                .records()
                .await
                .iter()
                .any(|r| matches!(r, AuditRecord::Incident(_)))
        );
    }

    #[tokio::test]
    async fn test_explicit_escalation_skips_manual_trips() {
        let h = harness(true);
        let event = h
            .engine
            .manual_trip("dailyLoss", "ops1", "drill")
            .await
            .unwrap();
        assert!(h.engine.escalate(&[event]).await.is_empty());
    }

    #[tokio::test]
    async fn test_revoked_breaker_not_evaluated() {
        let h = harness(false);
        h.engine.revoke("dailyLoss", "lead").await.unwrap();
        assert!(h.engine.evaluate(&loss(dec!(0.06))).await.is_empty());
        assert!(h.engine.status().await[0].inert);
        assert!(h.engine.revoke("dailyLoss", "ops1").await.is_err());
    }

    #[test]
    fn test_build_rejects_unknown_action() {
        let result = CircuitBreakerEngine::builder()
            .add_breaker(daily_loss().with_actions(["liquidate"]))
            .with_catalog(catalog())
            .build();
        assert!(matches!(result, Err(FailsafeError::InvalidConfig { .. })));
    }
}
