//! Breaker registry and evaluator.

use super::predicate::{self, Verdict};
use crate::audit::AuditTrail;
use crate::clock::Clock;
use crate::dispatch::ActionDispatcher;
use chrono::{DateTime, Duration, Utc};
use failsafe_domain::{
    ActionPriority, AuditRecord, BreakerConfig, BreakerLifecycle, BreakerSnapshot, BreakerState,
    FailsafeError, FailsafeResult, ManualOverrideRecord, MetricsSnapshot, RecoveryRecord,
    TriggerEvent, TriggerKind,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// One breaker: immutable config plus its own serialization point.
struct BreakerSlot {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

/// Fixed table of breakers, each guarded by its own lock.
///
/// There is no lock spanning breakers: evaluation, manual operations and
/// action dispatch for different breakers proceed independently.
pub struct BreakerRegistry {
    /// Slots in load order.
    slots: Vec<Arc<BreakerSlot>>,
    /// Slot index by breaker name.
    index: HashMap<String, usize>,
    /// Dispatcher for action lists.
    dispatcher: Arc<ActionDispatcher>,
    /// Audit trail.
    audit: Arc<AuditTrail>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl BreakerRegistry {
    /// Loads and validates breaker configurations.
    ///
    /// # Errors
    /// Returns [`FailsafeError::InvalidConfig`] for any malformed config, a
    /// duplicate name, or an action identifier missing from the catalog.
    pub fn load(
        configs: Vec<BreakerConfig>,
        dispatcher: Arc<ActionDispatcher>,
        audit: Arc<AuditTrail>,
        clock: Arc<dyn Clock>,
    ) -> FailsafeResult<Self> {
        let mut slots = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());

        for config in configs {
            config.validate()?;

            if index.contains_key(&config.name) {
                return Err(FailsafeError::invalid_config(
                    &config.name,
                    "duplicate breaker name",
                ));
            }

            if let Some(missing) = config
                .actions
                .iter()
                .find(|id| !dispatcher.catalog().contains(id))
            {
                return Err(FailsafeError::invalid_config(
                    &config.name,
                    format!("unknown action '{}'", missing),
                ));
            }

            index.insert(config.name.clone(), slots.len());
            slots.push(Arc::new(BreakerSlot {
                config,
                state: Mutex::new(BreakerState::new()),
            }));
        }

        info!(breakers = slots.len(), "Breaker registry loaded");

        Ok(Self {
            slots,
            index,
            dispatcher,
            audit,
            clock,
        })
    }

    /// Number of registered breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether a breaker with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Gets the config of a registered breaker.
    #[must_use]
    pub fn config(&self, name: &str) -> Option<&BreakerConfig> {
        self.slot(name).ok().map(|slot| &slot.config)
    }

    fn slot(&self, name: &str) -> FailsafeResult<&Arc<BreakerSlot>> {
        self.index
            .get(name)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| FailsafeError::UnknownBreaker(name.to_string()))
    }

    /// Evaluates every eligible breaker against `snapshot`.
    ///
    /// Breakers inside their cooldown window are skipped without running
    /// their predicate. Each newly tripped breaker gets its own task running
    /// its action list; the call returns once all of them finish, with the
    /// events in registry order.
    pub async fn evaluate(&self, snapshot: &MetricsSnapshot) -> Vec<TriggerEvent> {
        let now = self.clock.now();
        let mut tripped = Vec::new();

        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(event) = Self::check_slot(slot, snapshot, now).await {
                tripped.push((i, event));
            }
        }

        if tripped.is_empty() {
            debug!("No breakers tripped");
            return Vec::new();
        }

        let mut tasks = JoinSet::new();
        for (pos, (i, _)) in tripped.iter().enumerate() {
            let slot = self.slots[*i].clone();
            let dispatcher = self.dispatcher.clone();
            tasks.spawn(async move {
                let outcomes = dispatcher
                    .dispatch(
                        &slot.config.name,
                        slot.config.trigger,
                        &slot.config.actions,
                        None,
                    )
                    .await;
                (pos, outcomes)
            });
        }

        let mut outcomes_by_pos = vec![Vec::new(); tripped.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, outcomes)) => outcomes_by_pos[pos] = outcomes,
                Err(e) => error!(error = %e, "Action dispatch task failed"),
            }
        }

        let mut events = Vec::with_capacity(tripped.len());
        for ((i, event), outcomes) in tripped.into_iter().zip(outcomes_by_pos) {
            self.slots[i].state.lock().await.last_outcomes = outcomes.clone();
            let event = event.with_outcomes(outcomes);
            self.audit.append(AuditRecord::Trigger(event.clone())).await;
            events.push(event);
        }

        events
    }

    /// Applies one evaluation tick to one breaker under its lock.
    async fn check_slot(
        slot: &BreakerSlot,
        snapshot: &MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> Option<TriggerEvent> {
        let config = &slot.config;
        let mut state = slot.state.lock().await;

        if state.inert {
            return None;
        }

        match state.lifecycle {
            BreakerLifecycle::ForcedOpen => None,
            BreakerLifecycle::Open => {
                if state.in_cooldown(now) {
                    debug!(breaker = %config.name, "In cooldown, skipping");
                    return None;
                }
                state.cooldown_until = None;

                if !config.recovers_automatically() {
                    debug!(breaker = %config.name, "Cooldown elapsed, awaiting manual reset");
                    return None;
                }

                match predicate::check(config.trigger, config.threshold, snapshot) {
                    Verdict::Trip { observed } => {
                        Some(Self::trip(config, &mut state, observed, snapshot, now))
                    }
                    Verdict::Hold => {
                        state.lifecycle = BreakerLifecycle::Closed;
                        info!(breaker = %config.name, "Breaker recovered automatically");
                        None
                    }
                    Verdict::Missing(field) => {
                        warn!(
                            breaker = %config.name,
                            field = field,
                            "Metric missing, recovery check deferred"
                        );
                        None
                    }
                }
            }
            BreakerLifecycle::Closed => {
                match predicate::check(config.trigger, config.threshold, snapshot) {
                    Verdict::Trip { observed } => {
                        Some(Self::trip(config, &mut state, observed, snapshot, now))
                    }
                    Verdict::Hold => None,
                    Verdict::Missing(field) => {
                        debug!(breaker = %config.name, field = field, "Metric missing, not evaluated");
                        None
                    }
                }
            }
        }
    }

    fn trip(
        config: &BreakerConfig,
        state: &mut BreakerState,
        observed: rust_decimal::Decimal,
        snapshot: &MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> TriggerEvent {
        let cooldown_secs = i64::try_from(config.cooldown_secs).unwrap_or(i64::MAX);

        state.lifecycle = BreakerLifecycle::Open;
        state.trip_count += 1;
        state.last_trip_at = Some(now);
        state.cooldown_until = Some(now + Duration::seconds(cooldown_secs));

        error!(
            breaker = %config.name,
            trigger = %config.trigger,
            threshold = %config.threshold,
            observed = %observed,
            trip_count = state.trip_count,
            "Circuit breaker tripped"
        );

        TriggerEvent::automatic(
            &config.name,
            config.trigger,
            config.threshold,
            observed,
            now,
            snapshot.clone(),
        )
    }

    /// Forces a breaker open and runs its actions at critical priority.
    ///
    /// # Errors
    /// Returns [`FailsafeError::UnknownBreaker`] if the name is not registered.
    pub async fn manual_trip(
        &self,
        name: &str,
        actor: &str,
        reason: &str,
    ) -> FailsafeResult<TriggerEvent> {
        let slot = self.slot(name)?.clone();
        let record = ManualOverrideRecord {
            breaker: name.to_string(),
            actor: actor.to_string(),
            reason: reason.to_string(),
            timestamp: self.clock.now(),
        };

        {
            let mut state = slot.state.lock().await;
            state.lifecycle = BreakerLifecycle::ForcedOpen;
            state.cooldown_until = None;
            state.trip_count += 1;
            state.last_trip_at = Some(record.timestamp);
            state.manual_override = Some(record.clone());
        }

        error!(breaker = name, actor = actor, reason = reason, "Circuit breaker manually tripped");
        self.audit
            .append(AuditRecord::ManualOverride(record.clone()))
            .await;

        let outcomes = self
            .dispatcher
            .dispatch(
                name,
                TriggerKind::Manual,
                &slot.config.actions,
                Some(ActionPriority::Critical),
            )
            .await;
        slot.state.lock().await.last_outcomes = outcomes.clone();

        let event = TriggerEvent::manual(slot.config.threshold, record).with_outcomes(outcomes);
        self.audit.append(AuditRecord::Trigger(event.clone())).await;

        Ok(event)
    }

    /// Closes a breaker, clearing cooldown and override.
    ///
    /// Resetting a breaker that is already closed with nothing to clear is a
    /// no-op and returns `Ok(None)`.
    ///
    /// # Errors
    /// Returns [`FailsafeError::UnknownBreaker`] if the name is not registered.
    pub async fn manual_reset(
        &self,
        name: &str,
        actor: &str,
    ) -> FailsafeResult<Option<RecoveryRecord>> {
        let slot = self.slot(name)?;

        let record = {
            let mut state = slot.state.lock().await;
            if state.is_pristine() {
                debug!(breaker = name, "Breaker already closed, reset ignored");
                return Ok(None);
            }

            let record = RecoveryRecord {
                breaker: name.to_string(),
                actor: actor.to_string(),
                previous: state.lifecycle,
                timestamp: self.clock.now(),
            };
            state.lifecycle = BreakerLifecycle::Closed;
            state.cooldown_until = None;
            state.manual_override = None;
            record
        };

        info!(
            breaker = name,
            actor = actor,
            previous = %record.previous,
            "Circuit breaker reset"
        );
        self.audit.append(AuditRecord::Recovery(record.clone())).await;

        Ok(Some(record))
    }

    /// Marks a breaker inert. It keeps its state and history but is never
    /// evaluated again.
    ///
    /// # Errors
    /// Returns [`FailsafeError::UnknownBreaker`] if the name is not registered.
    pub async fn revoke(&self, name: &str, actor: &str) -> FailsafeResult<()> {
        let slot = self.slot(name)?;

        {
            let mut state = slot.state.lock().await;
            if state.inert {
                return Ok(());
            }
            state.inert = true;
        }

        warn!(breaker = name, actor = actor, "Breaker revoked");
        self.audit
            .append(AuditRecord::Revocation {
                breaker: name.to_string(),
                actor: actor.to_string(),
                timestamp: self.clock.now(),
            })
            .await;

        Ok(())
    }

    /// Point-in-time view of every breaker, in load order.
    pub async fn status(&self) -> Vec<BreakerSnapshot> {
        let now = self.clock.now();
        let mut snapshots = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let state = slot.state.lock().await;
            snapshots.push(BreakerSnapshot::capture(&slot.config, &state, now));
        }
        snapshots
    }
}
