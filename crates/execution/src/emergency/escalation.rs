//! Escalation of breaker trips into emergency incidents.

use failsafe_domain::{IncidentDetails, IncidentKind, Severity, TriggerEvent, TriggerKind};
use serde_json::json;

/// Decides which trips become incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Whether the engine escalates trips on its own after evaluation.
    pub auto_escalate: bool,
    /// Trips mapping below this severity are not escalated.
    pub min_severity: Severity,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            auto_escalate: true,
            min_severity: Severity::High,
        }
    }
}

impl EscalationPolicy {
    /// Incident kind and severity for a trigger kind.
    ///
    /// Manual trips have no mapping: the operator already acted.
    #[must_use]
    pub fn classify(trigger: TriggerKind) -> Option<(IncidentKind, Severity)> {
        match trigger {
            TriggerKind::LossThreshold | TriggerKind::DrawdownLimit => {
                Some((IncidentKind::TradingLoss, Severity::High))
            }
            TriggerKind::ExchangeFailure => Some((IncidentKind::ExchangeFailure, Severity::High)),
            TriggerKind::LatencySpike
            | TriggerKind::ErrorRate
            | TriggerKind::SystemOverload
            | TriggerKind::PositionTimeout => Some((IncidentKind::SystemFailure, Severity::Medium)),
            TriggerKind::SecurityBreach => Some((IncidentKind::SecurityBreach, Severity::Critical)),
            TriggerKind::DataCorruption => Some((IncidentKind::DataCorruption, Severity::Critical)),
            TriggerKind::Manual => None,
        }
    }

    /// Builds the incident for a trip, if the policy escalates it.
    #[must_use]
    pub fn incident_for(
        &self,
        event: &TriggerEvent,
    ) -> Option<(IncidentKind, Severity, IncidentDetails)> {
        let (kind, severity) = Self::classify(event.trigger)?;
        if severity < self.min_severity {
            return None;
        }

        let observed = event
            .observed
            .map(|v| v.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let mut details = IncidentDetails::new(format!(
            "breaker {} tripped on {}: observed {} against threshold {}",
            event.breaker, event.trigger, observed, event.threshold
        ))
        .with_breaker(event.breaker.clone())
        .with_context("trigger_event", json!(event.id.to_string()))
        .with_context("threshold", json!(event.threshold.to_string()));

        if kind == IncidentKind::TradingLoss {
            if let Some(loss) = event.observed {
                details = details.with_loss_pct(loss);
            }
        }

        Some((kind, severity, details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use failsafe_domain::{ManualOverrideRecord, MetricsSnapshot};
    use rust_decimal_macros::dec;

    fn trip(trigger: TriggerKind, observed: rust_decimal::Decimal) -> TriggerEvent {
        TriggerEvent::automatic(
            "guard",
            trigger,
            dec!(0.05),
            observed,
            Utc::now(),
            MetricsSnapshot::default(),
        )
    }

    #[test]
    fn test_loss_trip_escalates_with_loss() {
        let policy = EscalationPolicy::default();
        let (kind, severity, details) = policy
            .incident_for(&trip(TriggerKind::LossThreshold, dec!(0.06)))
            .unwrap();

        assert_eq!(kind, IncidentKind::TradingLoss);
        assert_eq!(severity, Severity::High);
        assert_eq!(details.loss_pct, Some(dec!(0.06)));
        assert_eq!(details.breaker.as_deref(), Some("guard"));
    }

    #[test]
    fn test_minimum_severity() {
        let policy = EscalationPolicy::default();
        assert!(
            policy
                .incident_for(&trip(TriggerKind::LatencySpike, dec!(900)))
                .is_none()
        );

        let lenient = EscalationPolicy {
            min_severity: Severity::Low,
            ..Default::default()
        };
        let (kind, _, details) = lenient
            .incident_for(&trip(TriggerKind::LatencySpike, dec!(900)))
            .unwrap();
        assert_eq!(kind, IncidentKind::SystemFailure);
        assert!(details.loss_pct.is_none());
    }

    #[test]
    fn test_manual_trips_never_escalate() {
        let record = ManualOverrideRecord {
            breaker: "guard".to_string(),
            actor: "ops1".to_string(),
            reason: "drill".to_string(),
            timestamp: Utc::now(),
        };
        let event = TriggerEvent::manual(dec!(0.05), record);
        let lenient = EscalationPolicy {
            min_severity: Severity::Low,
            ..Default::default()
        };
        assert!(lenient.incident_for(&event).is_none());
    }
}
