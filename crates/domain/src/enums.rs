use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Condition a breaker watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    LossThreshold,
    DrawdownLimit,
    LatencySpike,
    ErrorRate,
    ExchangeFailure,
    PositionTimeout,
    SystemOverload,
    SecurityBreach,
    DataCorruption,
    Manual,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LossThreshold => "loss_threshold",
            Self::DrawdownLimit => "drawdown_limit",
            Self::LatencySpike => "latency_spike",
            Self::ErrorRate => "error_rate",
            Self::ExchangeFailure => "exchange_failure",
            Self::PositionTimeout => "position_timeout",
            Self::SystemOverload => "system_overload",
            Self::SecurityBreach => "security_breach",
            Self::DataCorruption => "data_corruption",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a single breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerLifecycle {
    /// Eligible for evaluation.
    Closed,
    /// Tripped by its condition.
    Open,
    /// Tripped by an operator; only a manual reset leaves this state.
    ForcedOpen,
}

impl BreakerLifecycle {
    /// Whether the breaker is tripped in any way.
    #[must_use]
    pub fn is_tripped(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl fmt::Display for BreakerLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::ForcedOpen => "forced_open",
        };
        f.write_str(s)
    }
}

/// Priority of a remediation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl ActionPriority {
    /// Upper bound on execution time imposed by the priority, if any.
    #[must_use]
    pub fn ceiling(self) -> Option<Duration> {
        match self {
            Self::Critical => Some(Duration::from_secs(10)),
            Self::High => Some(Duration::from_secs(30)),
            Self::Medium | Self::Low => None,
        }
    }

    /// Effective timeout for an action with the given configured maximum.
    #[must_use]
    pub fn effective_timeout(self, max_duration: Duration) -> Duration {
        match self.ceiling() {
            Some(ceiling) => max_duration.min(ceiling),
            None => max_duration,
        }
    }
}

/// Class of incident handled by the emergency coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    SecurityBreach,
    SystemFailure,
    TradingLoss,
    ExchangeFailure,
    DataCorruption,
}

impl IncidentKind {
    /// Teams engaged for this kind of incident.
    #[must_use]
    pub fn teams(self) -> &'static [Team] {
        match self {
            Self::SecurityBreach => &[Team::Security, Team::Legal, Team::Management],
            Self::SystemFailure => &[Team::Engineering, Team::Operations],
            Self::TradingLoss => &[Team::Trading, Team::RiskManagement, Team::Management],
            Self::ExchangeFailure => &[Team::Trading, Team::Engineering, Team::Operations],
            Self::DataCorruption => &[Team::Engineering, Team::Compliance, Team::Management],
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SecurityBreach => "security_breach",
            Self::SystemFailure => "system_failure",
            Self::TradingLoss => "trading_loss",
            Self::ExchangeFailure => "exchange_failure",
            Self::DataCorruption => "data_corruption",
        };
        f.write_str(s)
    }
}

/// Incident severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Security,
    Legal,
    Management,
    Engineering,
    Operations,
    Trading,
    RiskManagement,
    Compliance,
}

/// Transport used to reach an emergency contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Chat,
    Voice,
    Webhook,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Chat => "chat",
            Self::Voice => "voice",
            Self::Webhook => "webhook",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ceiling() {
        let long = Duration::from_secs(60);
        assert_eq!(
            ActionPriority::Critical.effective_timeout(long),
            Duration::from_secs(10)
        );
        assert_eq!(
            ActionPriority::High.effective_timeout(long),
            Duration::from_secs(30)
        );
        assert_eq!(ActionPriority::Medium.effective_timeout(long), long);
        assert_eq!(ActionPriority::Low.effective_timeout(long), long);

        let short = Duration::from_secs(2);
        assert_eq!(ActionPriority::Critical.effective_timeout(short), short);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_incident_teams() {
        assert_eq!(
            IncidentKind::SecurityBreach.teams(),
            &[Team::Security, Team::Legal, Team::Management]
        );
        assert!(IncidentKind::TradingLoss.teams().contains(&Team::RiskManagement));
    }

    #[test]
    fn test_trigger_kind_serde() {
        let json = serde_json::to_string(&TriggerKind::LossThreshold).unwrap();
        assert_eq!(json, "\"loss_threshold\"");
        let kind: TriggerKind = serde_json::from_str("\"security_breach\"").unwrap();
        assert_eq!(kind, TriggerKind::SecurityBreach);
        assert!(serde_json::from_str::<TriggerKind>("\"moon_phase\"").is_err());
    }
}
