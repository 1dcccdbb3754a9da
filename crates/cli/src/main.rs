//! Command Line Interface for the fail-safe control core.
use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use failsafe_data::JsonlAuditSink;
use failsafe_domain::{
    BreakerSnapshot, ChannelKind, IncidentDetails, IncidentKind, IncidentRecord, MetricsSnapshot,
    Severity, TriggerEvent,
};
use failsafe_execution::audit::{AuditConfig, AuditSink, AuditTrail, MemoryAuditSink};
use failsafe_execution::clock::{Clock, SystemClock};
use failsafe_execution::dispatch::{ConfirmationGateway, DenyAllConfirmations};
use failsafe_execution::emergency::{ConsoleChannel, EmergencyCoordinator, ProcedurePlan};
use failsafe_execution::engine::CircuitBreakerEngine;
use prettytable::{Table, row};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod dry_run;

use config::{FailsafeConfig, parse_enum};
use dry_run::{ApproveAll, DryRunAction, DryRunProcedure};

#[derive(Parser)]
#[command(name = "failsafe")]
#[command(about = "Circuit breaker and emergency response control core", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $FAILSAFE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append audit records to this JSON-lines file
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration
    Validate,
    /// Evaluate a metrics snapshot with dry-run remediation
    Evaluate {
        /// Metrics snapshot JSON file
        #[arg(short, long)]
        metrics: PathBuf,

        /// Approve confirmation-gated actions
        #[arg(long, default_value_t = false)]
        approve: bool,
    },
    /// Raise an incident with the emergency coordinator
    Incident {
        /// Incident kind (e.g. trading_loss, security_breach)
        #[arg(short, long)]
        kind: String,

        /// Severity (low, medium, high, critical)
        #[arg(short, long, default_value = "high")]
        severity: String,

        /// Incident summary
        #[arg(long)]
        summary: String,

        /// Loss as a fraction of equity (e.g. 0.06)
        #[arg(long)]
        loss_pct: Option<Decimal>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config_path = FailsafeConfig::resolve_path(cli.config.clone())?;
    let config = FailsafeConfig::load(&config_path).await?;
    let audit = open_audit(cli.audit_log.as_deref()).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match &cli.command {
        Commands::Validate => {
            println!("🔍 Validating {}...", config_path.display());
            let engine = build_engine(&config, audit.clone(), clock, false)?;

            println!(
                "✅ {} breakers, {} actions, {} contacts",
                config.breakers.len(),
                config.actions.len(),
                config.contacts.len()
            );
            print_breakers(&config);
            print_status(&engine.status().await);
        }
        Commands::Evaluate { metrics, approve } => {
            let json = tokio::fs::read_to_string(metrics).await?;
            let snapshot: MetricsSnapshot = serde_json::from_str(&json)?;
            let engine = build_engine(&config, audit.clone(), clock, *approve)?;

            println!("📡 Evaluating {} metric fields...", snapshot.fields.len());
            let events = engine.evaluate(&snapshot).await;

            if events.is_empty() {
                println!("✅ No breakers tripped.");
            } else {
                println!("🚨 {} breakers tripped:", events.len());
                print_events(&events);
            }

            let incidents = engine.wait_for_escalations().await;
            for incident in &incidents {
                print_incident(incident)?;
            }
            print_status(&engine.status().await);
        }
        Commands::Incident {
            kind,
            severity,
            summary,
            loss_pct,
        } => {
            let kind: IncidentKind = parse_enum(kind)?;
            let severity: Severity = parse_enum(severity)?;
            let mut details = IncidentDetails::new(summary.clone());
            if let Some(loss) = loss_pct {
                details = details.with_loss_pct(*loss);
            }

            let coordinator = build_coordinator(&config, audit.clone(), clock);
            println!("🚨 Raising {} incident ({})...", kind, severity);
            let record = coordinator.handle_incident(kind, severity, details).await;
            print_incident(&record)?;
        }
    }

    let flushed = audit.flush().await;
    let pending = audit.pending().await;
    if pending > 0 {
        println!(
            "⚠️  {} audit records could not be written ({} flushed)",
            pending, flushed
        );
    }

    Ok(())
}

async fn open_audit(path: Option<&Path>) -> Result<Arc<AuditTrail>> {
    let sink: Arc<dyn AuditSink> = match path {
        Some(path) => Arc::new(JsonlAuditSink::open(path).await?),
        None => Arc::new(MemoryAuditSink::new()),
    };
    Ok(Arc::new(AuditTrail::new(sink, AuditConfig::default())))
}

fn build_coordinator(
    config: &FailsafeConfig,
    audit: Arc<AuditTrail>,
    clock: Arc<dyn Clock>,
) -> EmergencyCoordinator {
    let plan = ProcedurePlan::default();
    let ids: Vec<String> = plan
        .procedure_ids()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut coordinator =
        EmergencyCoordinator::new(config.incident.coordinator_config(), audit, clock)
            .with_plan(plan);
    for id in ids {
        coordinator =
            coordinator.with_procedure(id.clone(), Arc::new(DryRunProcedure { id }));
    }
    for kind in [
        ChannelKind::Email,
        ChannelKind::Sms,
        ChannelKind::Chat,
        ChannelKind::Voice,
        ChannelKind::Webhook,
    ] {
        coordinator = coordinator.with_channel(Arc::new(ConsoleChannel::new(kind)));
    }
    for contact in &config.contacts {
        coordinator = coordinator.with_contact(contact.clone());
    }
    coordinator
}

fn build_engine(
    config: &FailsafeConfig,
    audit: Arc<AuditTrail>,
    clock: Arc<dyn Clock>,
    approve: bool,
) -> Result<CircuitBreakerEngine> {
    let catalog = config.catalog(|_| Arc::new(DryRunAction))?;
    let confirmations: Arc<dyn ConfirmationGateway> = if approve {
        Arc::new(ApproveAll)
    } else {
        Arc::new(DenyAllConfirmations)
    };
    let coordinator = build_coordinator(config, audit.clone(), clock.clone());

    let engine = CircuitBreakerEngine::builder()
        .with_breakers(config.breakers.clone())
        .with_catalog(catalog)
        .with_confirmations(confirmations)
        .with_audit(audit)
        .with_clock(clock)
        .with_coordinator(Arc::new(coordinator))
        .with_escalation_policy(config.incident.escalation_policy())
        .build()?;
    Ok(engine)
}

fn print_breakers(config: &FailsafeConfig) {
    let mut table = Table::new();
    table.add_row(row![
        "Breaker", "Trigger", "Threshold", "Cooldown", "Auto", "Actions"
    ]);
    for breaker in &config.breakers {
        table.add_row(row![
            breaker.name,
            breaker.trigger,
            breaker.threshold,
            format!("{}s", breaker.cooldown_secs),
            breaker.recovers_automatically(),
            breaker.actions.join(", ")
        ]);
    }
    table.printstd();
}

fn print_events(events: &[TriggerEvent]) {
    let mut table = Table::new();
    table.add_row(row!["Breaker", "Trigger", "Observed", "Threshold", "Actions"]);
    for event in events {
        let observed = event
            .observed
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let succeeded = event.outcomes.iter().filter(|o| o.succeeded()).count();
        table.add_row(row![
            event.breaker,
            event.trigger,
            observed,
            event.threshold,
            format!("{}/{} ok", succeeded, event.outcomes.len())
        ]);
    }
    table.printstd();
}

fn print_status(status: &[BreakerSnapshot]) {
    let mut table = Table::new();
    table.add_row(row!["Breaker", "State", "Trips", "Cooldown until", "Inert"]);
    for snapshot in status {
        let cooldown = snapshot
            .cooldown_until
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![
            snapshot.name,
            snapshot.lifecycle,
            snapshot.trip_count,
            cooldown,
            snapshot.inert
        ]);
    }
    table.printstd();
}

fn print_incident(record: &IncidentRecord) -> Result<()> {
    println!(
        "📋 Incident {} ({} / {}): {} procedures, {} failed, {} notified",
        record.id,
        record.kind,
        record.severity,
        record.actions_taken.len(),
        record.failed_actions(),
        record.delivered_notifications()
    );
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}
