//! Incident remediation procedures and the plan that selects them.

use async_trait::async_trait;
use failsafe_domain::{IncidentDetails, IncidentKind, Severity};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Context handed to an incident procedure.
#[derive(Debug, Clone)]
pub struct IncidentContext {
    pub incident_id: Uuid,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub details: IncidentDetails,
}

/// Embedder-supplied remediation facet for an incident.
///
/// Procedures of one incident run concurrently and own their own
/// failure handling; the returned string is recorded as the action detail.
#[async_trait]
pub trait IncidentProcedure: Send + Sync {
    /// Runs the procedure.
    async fn execute(&self, ctx: &IncidentContext) -> anyhow::Result<String>;
}

/// Procedure set chosen for an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureSet {
    /// Set name recorded on the incident.
    pub name: String,
    /// Procedure identifiers.
    pub procedures: Vec<String>,
}

/// Mapping from incident kind to procedure identifiers.
#[derive(Debug, Clone)]
pub struct ProcedurePlan {
    /// Procedures per kind, trading loss excluded.
    sets: HashMap<IncidentKind, Vec<String>>,
    /// Trading loss procedures at or above the loss threshold.
    trading_loss_aggressive: Vec<String>,
    /// Trading loss procedures below the loss threshold.
    trading_loss_conservative: Vec<String>,
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ProcedurePlan {
    fn default() -> Self {
        let mut sets = HashMap::new();
        sets.insert(
            IncidentKind::SecurityBreach,
            ids(&[
                "isolate_systems",
                "revoke_credentials",
                "preserve_evidence",
                "halt_trading",
            ]),
        );
        sets.insert(
            IncidentKind::SystemFailure,
            ids(&["failover_services", "halt_trading", "collect_diagnostics"]),
        );
        sets.insert(
            IncidentKind::ExchangeFailure,
            ids(&[
                "cancel_open_orders",
                "switch_exchange",
                "reconcile_positions",
            ]),
        );
        sets.insert(
            IncidentKind::DataCorruption,
            ids(&[
                "halt_trading",
                "restore_from_backup",
                "verify_data_integrity",
            ]),
        );

        Self {
            sets,
            trading_loss_aggressive: ids(&[
                "close_all_positions",
                "notify_risk_committee",
                "halt_trading",
                "generate_loss_report",
            ]),
            trading_loss_conservative: ids(&[
                "reduce_positions",
                "notify_risk_committee",
                "generate_loss_report",
            ]),
        }
    }
}

impl ProcedurePlan {
    /// Replaces the procedures for a kind other than trading loss.
    #[must_use]
    pub fn with_set(mut self, kind: IncidentKind, procedures: Vec<String>) -> Self {
        self.sets.insert(kind, procedures);
        self
    }

    /// Replaces the trading loss procedure sets.
    #[must_use]
    pub fn with_trading_loss(mut self, aggressive: Vec<String>, conservative: Vec<String>) -> Self {
        self.trading_loss_aggressive = aggressive;
        self.trading_loss_conservative = conservative;
        self
    }

    /// Every procedure identifier the plan can select.
    #[must_use]
    pub fn procedure_ids(&self) -> BTreeSet<&str> {
        self.sets
            .values()
            .chain([&self.trading_loss_aggressive, &self.trading_loss_conservative])
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Chooses the procedure set for an incident.
    ///
    /// Trading losses at or above `aggressive_loss_pct` get the aggressive
    /// set; without a reported loss, critical severity does.
    #[must_use]
    pub fn select(
        &self,
        kind: IncidentKind,
        severity: Severity,
        details: &IncidentDetails,
        aggressive_loss_pct: Decimal,
    ) -> ProcedureSet {
        if kind == IncidentKind::TradingLoss {
            let aggressive = match details.loss_pct {
                Some(loss) => loss.abs() >= aggressive_loss_pct,
                None => severity == Severity::Critical,
            };
            return if aggressive {
                ProcedureSet {
                    name: "trading_loss_aggressive".to_string(),
                    procedures: self.trading_loss_aggressive.clone(),
                }
            } else {
                ProcedureSet {
                    name: "trading_loss_conservative".to_string(),
                    procedures: self.trading_loss_conservative.clone(),
                }
            };
        }

        ProcedureSet {
            name: kind.to_string(),
            procedures: self.sets.get(&kind).cloned().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trading_loss_gating() {
        let plan = ProcedurePlan::default();

        let big = IncidentDetails::new("loss").with_loss_pct(dec!(0.08));
        let set = plan.select(IncidentKind::TradingLoss, Severity::High, &big, dec!(0.05));
        assert_eq!(set.name, "trading_loss_aggressive");
        assert!(set.procedures.contains(&"close_all_positions".to_string()));

        let small = IncidentDetails::new("loss").with_loss_pct(dec!(0.02));
        let set = plan.select(IncidentKind::TradingLoss, Severity::High, &small, dec!(0.05));
        assert_eq!(set.name, "trading_loss_conservative");
        assert!(!set.procedures.contains(&"halt_trading".to_string()));

        let unknown = IncidentDetails::new("loss");
        let set = plan.select(IncidentKind::TradingLoss, Severity::Critical, &unknown, dec!(0.05));
        assert_eq!(set.name, "trading_loss_aggressive");
    }

    #[test]
    fn test_kind_sets() {
        let plan = ProcedurePlan::default()
            .with_set(IncidentKind::SystemFailure, vec!["page_oncall".to_string()]);

        let set = plan.select(
            IncidentKind::SystemFailure,
            Severity::Medium,
            &IncidentDetails::default(),
            dec!(0.05),
        );
        assert_eq!(set.name, "system_failure");
        assert_eq!(set.procedures, vec!["page_oncall".to_string()]);

        let ids = plan.procedure_ids();
        assert!(ids.contains("page_oncall"));
        assert!(ids.contains("close_all_positions"));
        assert!(!ids.contains("failover_services"));
    }
}
