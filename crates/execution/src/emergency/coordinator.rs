//! Emergency response coordinator.

use super::{
    EmergencyContact, IncidentContext, IncidentProcedure, NotificationChannel,
    NotificationMessage, ProcedurePlan, ProcedureSet,
};
use crate::audit::AuditTrail;
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use failsafe_domain::{
    AuditRecord, ChannelKind, IncidentDetails, IncidentKind, IncidentRecord, NotificationAttempt,
    NotificationStatus, ProcedureOutcome, Severity,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Configuration for the emergency coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Trading loss fraction at or above which the aggressive plan runs.
    pub aggressive_loss_pct: Decimal,
    /// Upper bound on a single procedure in seconds.
    pub procedure_timeout_secs: u64,
    /// Upper bound on a single notification attempt in seconds.
    pub notification_timeout_secs: u64,
    /// Maximum notification attempts in flight.
    pub notification_concurrency: usize,
    /// Window in seconds during which a contact already reached is not
    /// re-notified about the same incident kind. Never applies to critical incidents.
    pub suppression_window_secs: u64,
    /// Incidents kept in the in-memory log.
    pub incident_log_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            aggressive_loss_pct: Decimal::new(5, 2), // 5%
            procedure_timeout_secs: 300,
            notification_timeout_secs: 15,
            notification_concurrency: 8,
            suppression_window_secs: 300, // 5 minutes
            incident_log_capacity: 1_000,
        }
    }
}

/// Escalates incidents into notifications and concurrent remediation.
///
/// Handling an incident never fails from the caller's point of view: every
/// procedure and notification failure is captured in the returned record.
pub struct EmergencyCoordinator {
    /// Configuration.
    config: CoordinatorConfig,
    /// Procedure selection.
    plan: ProcedurePlan,
    /// Registered procedures by identifier.
    procedures: HashMap<String, Arc<dyn IncidentProcedure>>,
    /// Emergency contacts.
    contacts: Vec<EmergencyContact>,
    /// Transports by channel.
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    /// Bounds notification attempts in flight.
    notify_limit: Arc<Semaphore>,
    /// Last notification per contact and incident kind.
    last_notified: Mutex<HashMap<(String, IncidentKind), DateTime<Utc>>>,
    /// Handled incidents, oldest first.
    incidents: RwLock<VecDeque<IncidentRecord>>,
    /// Audit trail.
    audit: Arc<AuditTrail>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl EmergencyCoordinator {
    /// Creates a coordinator with the default plan, no procedures, contacts or channels.
    pub fn new(config: CoordinatorConfig, audit: Arc<AuditTrail>, clock: Arc<dyn Clock>) -> Self {
        let permits = config.notification_concurrency.max(1);
        Self {
            config,
            plan: ProcedurePlan::default(),
            procedures: HashMap::new(),
            contacts: Vec::new(),
            channels: HashMap::new(),
            notify_limit: Arc::new(Semaphore::new(permits)),
            last_notified: Mutex::new(HashMap::new()),
            incidents: RwLock::new(VecDeque::new()),
            audit,
            clock,
        }
    }

    /// Replaces the procedure plan.
    #[must_use]
    pub fn with_plan(mut self, plan: ProcedurePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Registers a procedure under `id`.
    #[must_use]
    pub fn with_procedure(
        mut self,
        id: impl Into<String>,
        procedure: Arc<dyn IncidentProcedure>,
    ) -> Self {
        self.procedures.insert(id.into(), procedure);
        self
    }

    /// Adds an emergency contact.
    #[must_use]
    pub fn with_contact(mut self, contact: EmergencyContact) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Adds a transport; replaces any transport for the same channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Handles an incident and returns its record.
    pub async fn handle_incident(
        &self,
        kind: IncidentKind,
        severity: Severity,
        details: IncidentDetails,
    ) -> IncidentRecord {
        let id = Uuid::new_v4();
        let opened_at = self.clock.now();
        let teams = kind.teams().to_vec();
        let set = self
            .plan
            .select(kind, severity, &details, self.config.aggressive_loss_pct);

        error!(
            incident_id = %id,
            kind = %kind,
            severity = %severity,
            procedure_set = %set.name,
            summary = %details.summary,
            "Emergency incident opened"
        );

        let ctx = IncidentContext {
            incident_id: id,
            kind,
            severity,
            details: details.clone(),
        };
        let message = NotificationMessage {
            incident_id: id,
            kind,
            severity,
            title: format!("{} incident", kind),
            summary: details.summary.clone(),
            teams: teams.clone(),
        };

        let (notifications, actions_taken) =
            tokio::join!(self.notify(&message), self.run_procedures(&ctx, &set));

        let record = IncidentRecord {
            id,
            kind,
            severity,
            details,
            teams,
            procedure_set: set.name,
            opened_at,
            finalized_at: self.clock.now(),
            actions_taken,
            notifications,
            resolution: None,
            lessons_learned: None,
        };

        info!(
            incident_id = %id,
            actions = record.actions_taken.len(),
            failed_actions = record.failed_actions(),
            notified = record.delivered_notifications(),
            "Emergency incident finalized"
        );

        {
            let mut incidents = self.incidents.write().await;
            incidents.push_back(record.clone());
            while incidents.len() > self.config.incident_log_capacity {
                incidents.pop_front();
            }
        }
        self.audit
            .append(AuditRecord::Incident(Box::new(record.clone())))
            .await;

        record
    }

    /// Handled incidents, oldest first.
    pub async fn incidents(&self) -> Vec<IncidentRecord> {
        self.incidents.read().await.iter().cloned().collect()
    }

    /// Runs every procedure of the set concurrently and waits for all of them.
    async fn run_procedures(
        &self,
        ctx: &IncidentContext,
        set: &ProcedureSet,
    ) -> Vec<ProcedureOutcome> {
        let timeout = Duration::from_secs(self.config.procedure_timeout_secs);
        let mut slots: Vec<Option<ProcedureOutcome>> = vec![None; set.procedures.len()];
        let mut tasks = JoinSet::new();

        for (pos, id) in set.procedures.iter().enumerate() {
            let Some(procedure) = self.procedures.get(id).cloned() else {
                warn!(incident_id = %ctx.incident_id, procedure = %id, "Procedure not registered");
                slots[pos] = Some(ProcedureOutcome {
                    procedure: id.clone(),
                    succeeded: false,
                    detail: "procedure not registered".to_string(),
                    duration: Duration::ZERO,
                });
                continue;
            };

            let ctx = ctx.clone();
            let id = id.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let inner = tokio::spawn(async move { procedure.execute(&ctx).await });
                let abort = inner.abort_handle();
                let result = match tokio::time::timeout(timeout, inner).await {
                    Ok(Ok(Ok(detail))) => Ok(detail),
                    Ok(Ok(Err(e))) => Err(e.to_string()),
                    Ok(Err(e)) => Err(format!("procedure aborted: {}", e)),
                    Err(_) => {
                        abort.abort();
                        Err(format!("timed out after {:?}", timeout))
                    }
                };
                (pos, id, result, started.elapsed())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, id, result, duration)) => {
                    let outcome = match result {
                        Ok(detail) => {
                            info!(procedure = %id, "Incident procedure completed");
                            ProcedureOutcome {
                                procedure: id,
                                succeeded: true,
                                detail,
                                duration,
                            }
                        }
                        Err(detail) => {
                            warn!(procedure = %id, error = %detail, "Incident procedure failed");
                            ProcedureOutcome {
                                procedure: id,
                                succeeded: false,
                                detail,
                                duration,
                            }
                        }
                    };
                    slots[pos] = Some(outcome);
                }
                Err(e) => error!(error = %e, "Incident procedure task failed"),
            }
        }

        slots
            .into_iter()
            .zip(&set.procedures)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| ProcedureOutcome {
                    procedure: id.clone(),
                    succeeded: false,
                    detail: "procedure task aborted".to_string(),
                    duration: Duration::ZERO,
                })
            })
            .collect()
    }

    /// Sends the message to every interested contact over each of their channels.
    async fn notify(&self, message: &NotificationMessage) -> Vec<NotificationAttempt> {
        let now = self.clock.now();
        let timeout = Duration::from_secs(self.config.notification_timeout_secs);
        let mut slots: Vec<(String, ChannelKind, Option<NotificationAttempt>)> = Vec::new();
        let mut tasks = JoinSet::new();

        let recipients = self
            .contacts
            .iter()
            .filter(|c| c.wants(&message.teams, message.severity));

        for contact in recipients {
            let suppressed = self.is_suppressed(contact, message, now).await;

            for &channel in &contact.channels {
                let pos = slots.len();
                slots.push((contact.name.clone(), channel, None));

                if suppressed {
                    slots[pos].2 = Some(NotificationAttempt {
                        contact: contact.name.clone(),
                        channel,
                        status: NotificationStatus::Suppressed,
                        error: None,
                    });
                    continue;
                }

                let Some(transport) = self.channels.get(&channel).cloned() else {
                    warn!(contact = %contact.name, channel = %channel, "Channel not configured");
                    slots[pos].2 = Some(NotificationAttempt {
                        contact: contact.name.clone(),
                        channel,
                        status: NotificationStatus::Failed,
                        error: Some("channel not configured".to_string()),
                    });
                    continue;
                };

                let contact = contact.clone();
                let message = message.clone();
                let limit = self.notify_limit.clone();
                tasks.spawn(async move {
                    let _permit = limit.acquire_owned().await.ok();
                    let error =
                        match tokio::time::timeout(timeout, transport.send(&contact, &message))
                            .await
                        {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(e.to_string()),
                            Err(_) => Some(format!("timed out after {:?}", timeout)),
                        };
                    (pos, contact.name, channel, error)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, contact, channel, error)) => {
                    let status = match &error {
                        None => NotificationStatus::Delivered,
                        Some(e) => {
                            warn!(contact = %contact, channel = %channel, error = %e, "Notification failed");
                            NotificationStatus::Failed
                        }
                    };
                    slots[pos].2 = Some(NotificationAttempt {
                        contact,
                        channel,
                        status,
                        error,
                    });
                }
                Err(e) => error!(error = %e, "Notification task failed"),
            }
        }

        let attempts: Vec<NotificationAttempt> = slots
            .into_iter()
            .map(|(contact, channel, attempt)| {
                attempt.unwrap_or(NotificationAttempt {
                    contact,
                    channel,
                    status: NotificationStatus::Failed,
                    error: Some("notification task aborted".to_string()),
                })
            })
            .collect();

        self.record_deliveries(&attempts, message.kind, now).await;
        attempts
    }

    /// Whether `contact` was reached about this incident kind within the window.
    async fn is_suppressed(
        &self,
        contact: &EmergencyContact,
        message: &NotificationMessage,
        now: DateTime<Utc>,
    ) -> bool {
        if message.severity == Severity::Critical || self.config.suppression_window_secs == 0 {
            return false;
        }

        let window = chrono::Duration::seconds(
            i64::try_from(self.config.suppression_window_secs).unwrap_or(i64::MAX),
        );
        let key = (contact.name.clone(), message.kind);

        self.last_notified
            .lock()
            .await
            .get(&key)
            .is_some_and(|at| now - *at < window)
    }

    /// Starts the suppression window for every contact reached on at least one channel.
    async fn record_deliveries(
        &self,
        attempts: &[NotificationAttempt],
        kind: IncidentKind,
        now: DateTime<Utc>,
    ) {
        let mut last = self.last_notified.lock().await;
        for attempt in attempts
            .iter()
            .filter(|a| a.status == NotificationStatus::Delivered)
        {
            last.insert((attempt.contact.clone(), kind), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditConfig, MemoryAuditSink};
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use failsafe_domain::Team;
    use rust_decimal_macros::dec;
    use tokio::sync::Barrier;

    struct Recording {
        kind: ChannelKind,
        fail: bool,
        sent: std::sync::Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(kind: ChannelKind, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail,
                sent: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for Recording {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(
            &self,
            contact: &EmergencyContact,
            _message: &NotificationMessage,
        ) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("gateway down");
            }
            self.sent.lock().unwrap().push(contact.name.clone());
            Ok(())
        }
    }

    enum Step {
        Ok,
        Fail,
        Panic,
        Rendezvous(Arc<Barrier>),
    }

    struct Scripted(Step);

    #[async_trait]
    impl IncidentProcedure for Scripted {
        async fn execute(&self, ctx: &IncidentContext) -> anyhow::Result<String> {
            match &self.0 {
                Step::Ok => Ok(format!("done for {}", ctx.kind)),
                Step::Fail => anyhow::bail!("broker unreachable"),
                Step::Panic => panic!("procedure bug"),
                Step::Rendezvous(barrier) => {
                    barrier.wait().await;
                    Ok("met".to_string())
                }
            }
        }
    }

    fn coordinator(config: CoordinatorConfig) -> (EmergencyCoordinator, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Arc::new(AuditTrail::new(sink.clone(), AuditConfig::default()));
        let clock = Arc::new(ManualClock::default());
        (EmergencyCoordinator::new(config, audit, clock), sink)
    }

    fn plan(kind: IncidentKind, ids: &[&str]) -> ProcedurePlan {
        ProcedurePlan::default().with_set(kind, ids.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_total_failure_still_returns_record() {
        let (coord, sink) = coordinator(CoordinatorConfig::default());
        let coord = coord
            .with_plan(plan(
                IncidentKind::SystemFailure,
                &["failover", "crash", "unregistered"],
            ))
            .with_procedure("failover", Arc::new(Scripted(Step::Fail)))
            .with_procedure("crash", Arc::new(Scripted(Step::Panic)))
            .with_channel(Recording::new(ChannelKind::Email, true))
            .with_contact(
                EmergencyContact::new("eng", Team::Engineering, Severity::Low)
                    .via(ChannelKind::Email, "eng@example.com")
                    .via(ChannelKind::Voice, "+100"),
            );

        let record = coord
            .handle_incident(
                IncidentKind::SystemFailure,
                Severity::High,
                IncidentDetails::new("matching engine unreachable"),
            )
            .await;

        assert_eq!(record.actions_taken.len(), 3);
        assert_eq!(record.failed_actions(), 3);
        assert_eq!(record.actions_taken[0].procedure, "failover");
        assert_eq!(record.actions_taken[2].detail, "procedure not registered");
        assert_eq!(record.notifications.len(), 2);
        assert!(
            record
                .notifications
                .iter()
                .all(|n| n.status == NotificationStatus::Failed)
        );
        assert!(record.resolution.is_none());
        assert!(record.lessons_learned.is_none());
        assert_eq!(sink.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_procedures_run_concurrently() {
        let barrier = Arc::new(Barrier::new(3));
        let config = CoordinatorConfig {
            procedure_timeout_secs: 5,
            ..Default::default()
        };
        let (coord, _) = coordinator(config);
        let coord = coord
            .with_plan(plan(IncidentKind::SecurityBreach, &["a", "b", "c"]))
            .with_procedure("a", Arc::new(Scripted(Step::Rendezvous(barrier.clone()))))
            .with_procedure("b", Arc::new(Scripted(Step::Rendezvous(barrier.clone()))))
            .with_procedure("c", Arc::new(Scripted(Step::Rendezvous(barrier))));

        let record = coord
            .handle_incident(
                IncidentKind::SecurityBreach,
                Severity::Critical,
                IncidentDetails::new("credential leak"),
            )
            .await;

        assert_eq!(record.failed_actions(), 0);
        assert_eq!(
            record.teams,
            vec![Team::Security, Team::Legal, Team::Management]
        );
    }

    #[tokio::test]
    async fn test_contacts_filtered_by_team_and_severity() {
        let sms = Recording::new(ChannelKind::Sms, false);
        let (coord, _) = coordinator(CoordinatorConfig::default());
        let coord = coord
            .with_plan(plan(IncidentKind::TradingLoss, &[]))
            .with_channel(sms.clone())
            .with_contact(
                EmergencyContact::new("trader", Team::Trading, Severity::Medium)
                    .via(ChannelKind::Sms, "+1"),
            )
            .with_contact(
                EmergencyContact::new("ceo", Team::Management, Severity::Critical)
                    .via(ChannelKind::Sms, "+2"),
            )
            .with_contact(
                EmergencyContact::new("ciso", Team::Security, Severity::Low)
                    .via(ChannelKind::Sms, "+3"),
            );

        let record = coord
            .handle_incident(
                IncidentKind::TradingLoss,
                Severity::High,
                IncidentDetails::new("daily loss 3%").with_loss_pct(dec!(0.03)),
            )
            .await;

        assert_eq!(*sms.sent.lock().unwrap(), vec!["trader"]);
        assert_eq!(record.delivered_notifications(), 1);
        assert_eq!(record.procedure_set, "trading_loss_conservative");
    }

    #[tokio::test]
    async fn test_repeat_notifications_suppressed_unless_critical() {
        let chat = Recording::new(ChannelKind::Chat, false);
        let (coord, _) = coordinator(CoordinatorConfig::default());
        let coord = coord
            .with_plan(plan(IncidentKind::ExchangeFailure, &[]))
            .with_channel(chat.clone())
            .with_contact(
                EmergencyContact::new("desk", Team::Trading, Severity::Low)
                    .via(ChannelKind::Chat, "#desk"),
            );

        let details = IncidentDetails::new("exchange api down");
        coord
            .handle_incident(IncidentKind::ExchangeFailure, Severity::High, details.clone())
            .await;
        let second = coord
            .handle_incident(IncidentKind::ExchangeFailure, Severity::High, details.clone())
            .await;
        coord
            .handle_incident(IncidentKind::ExchangeFailure, Severity::Critical, details)
            .await;

        assert_eq!(
            second.notifications[0].status,
            NotificationStatus::Suppressed
        );
        assert_eq!(chat.sent.lock().unwrap().len(), 2);
        assert_eq!(coord.incidents().await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_suppress_next_incident() {
        let down = Recording::new(ChannelKind::Sms, true);
        let (coord, _) = coordinator(CoordinatorConfig::default());
        let contact = EmergencyContact::new("desk", Team::Trading, Severity::Low)
            .via(ChannelKind::Sms, "+1");
        let coord = coord
            .with_plan(plan(IncidentKind::ExchangeFailure, &[]))
            .with_channel(down)
            .with_contact(contact);

        let first = coord
            .handle_incident(
                IncidentKind::ExchangeFailure,
                Severity::High,
                IncidentDetails::new("exchange api down"),
            )
            .await;
        assert_eq!(first.notifications[0].status, NotificationStatus::Failed);

        // Gateway recovers.
        let up = Recording::new(ChannelKind::Sms, false);
        let coord = coord.with_channel(up.clone());

        let second = coord
            .handle_incident(
                IncidentKind::ExchangeFailure,
                Severity::High,
                IncidentDetails::new("exchange api still down"),
            )
            .await;
        assert_eq!(
            second.notifications[0].status,
            NotificationStatus::Delivered
        );
        assert_eq!(*up.sent.lock().unwrap(), vec!["desk"]);
    }

    #[tokio::test]
    async fn test_incident_log_is_bounded() {
        let config = CoordinatorConfig {
            incident_log_capacity: 2,
            ..Default::default()
        };
        let (coord, _) = coordinator(config);
        let coord = coord.with_plan(plan(IncidentKind::DataCorruption, &[]));

        for i in 0..3 {
            coord
                .handle_incident(
                    IncidentKind::DataCorruption,
                    Severity::Low,
                    IncidentDetails::new(format!("checksum mismatch {}", i)),
                )
                .await;
        }

        let incidents = coord.incidents().await;
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].details.summary, "checksum mismatch 1");
    }

    #[tokio::test]
    async fn test_successful_procedure_detail_recorded() {
        let (coord, _) = coordinator(CoordinatorConfig::default());
        let coord = coord
            .with_plan(plan(IncidentKind::DataCorruption, &["restore"]))
            .with_procedure("restore", Arc::new(Scripted(Step::Ok)));

        let record = coord
            .handle_incident(
                IncidentKind::DataCorruption,
                Severity::Medium,
                IncidentDetails::new("bad candles"),
            )
            .await;

        assert!(record.actions_taken[0].succeeded);
        assert_eq!(record.actions_taken[0].detail, "done for data_corruption");
        assert!(record.finalized_at >= record.opened_at);
    }
}
