//! Operator configuration file.

use anyhow::{Context, Result};
use failsafe_domain::{ActionPriority, BreakerConfig, FailsafeResult, Severity};
use failsafe_execution::dispatch::{ActionCatalog, ActionSpec, RemediationProcedure};
use failsafe_execution::emergency::{CoordinatorConfig, EmergencyContact, EscalationPolicy};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FAILSAFE_CONFIG";

/// Remediation action declared in the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// Action identifier referenced by breakers.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Priority.
    pub priority: ActionPriority,
    /// Maximum duration in seconds.
    pub max_duration_secs: u64,
    /// Whether a human must confirm before it runs.
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// Incident handling settings; unset values use the coordinator defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentSettings {
    /// Trading loss fraction that selects the aggressive plan.
    pub aggressive_loss_pct: Option<Decimal>,
    /// Procedure timeout in seconds.
    pub procedure_timeout_secs: Option<u64>,
    /// Notification timeout in seconds.
    pub notification_timeout_secs: Option<u64>,
    /// Duplicate notification suppression window in seconds.
    pub suppression_window_secs: Option<u64>,
    /// Escalate trips automatically.
    pub auto_escalate: Option<bool>,
    /// Lowest severity escalated.
    pub min_severity: Option<Severity>,
}

impl IncidentSettings {
    /// Coordinator configuration with these overrides applied.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let defaults = CoordinatorConfig::default();
        CoordinatorConfig {
            aggressive_loss_pct: self
                .aggressive_loss_pct
                .unwrap_or(defaults.aggressive_loss_pct),
            procedure_timeout_secs: self
                .procedure_timeout_secs
                .unwrap_or(defaults.procedure_timeout_secs),
            notification_timeout_secs: self
                .notification_timeout_secs
                .unwrap_or(defaults.notification_timeout_secs),
            suppression_window_secs: self
                .suppression_window_secs
                .unwrap_or(defaults.suppression_window_secs),
            ..defaults
        }
    }

    /// Escalation policy with these overrides applied.
    pub fn escalation_policy(&self) -> EscalationPolicy {
        let defaults = EscalationPolicy::default();
        EscalationPolicy {
            auto_escalate: self.auto_escalate.unwrap_or(defaults.auto_escalate),
            min_severity: self.min_severity.unwrap_or(defaults.min_severity),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailsafeConfig {
    /// Breakers to load.
    #[serde(default)]
    pub breakers: Vec<BreakerConfig>,
    /// Actions breakers may reference.
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    /// Emergency contacts.
    #[serde(default)]
    pub contacts: Vec<EmergencyContact>,
    /// Incident settings.
    #[serde(default)]
    pub incident: IncidentSettings,
}

impl FailsafeConfig {
    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid failsafe configuration")
    }

    /// Loads the configuration from `path`.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Resolves the configuration path from the flag or the environment.
    pub fn resolve_path(flag: Option<PathBuf>) -> Result<PathBuf> {
        flag.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .with_context(|| format!("no configuration given: pass --config or set {}", CONFIG_ENV))
    }

    /// Builds the action catalog, asking `procedure` for each action's body.
    pub fn catalog<F>(&self, procedure: F) -> FailsafeResult<ActionCatalog>
    where
        F: Fn(&ActionConfig) -> Arc<dyn RemediationProcedure>,
    {
        let mut catalog = ActionCatalog::new();
        for action in &self.actions {
            let mut spec = ActionSpec::new(
                &action.id,
                &action.name,
                action.priority,
                action.max_duration_secs,
                procedure(action),
            );
            if action.requires_confirmation {
                spec = spec.with_confirmation();
            }
            catalog.register(spec)?;
        }
        Ok(catalog)
    }
}

/// Parses a snake_case enum value the way the configuration spells it.
pub fn parse_enum<T: DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("unknown value '{}'", value))
}
