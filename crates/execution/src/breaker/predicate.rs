//! Trigger predicates: pure functions of kind, threshold and snapshot.

use failsafe_domain::metrics::fields;
use failsafe_domain::{MetricsSnapshot, TriggerKind};
use rust_decimal::Decimal;

/// Result of checking one breaker's condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Observed value reached the threshold.
    Trip {
        /// Observed value.
        observed: Decimal,
    },
    /// Condition not met.
    Hold,
    /// The snapshot lacks the field the predicate reads.
    Missing(&'static str),
}

/// Metric field a trigger kind reads, if any.
#[must_use]
pub fn field_for(kind: TriggerKind) -> Option<&'static str> {
    match kind {
        TriggerKind::LossThreshold => Some(fields::DAILY_LOSS_RATIO),
        TriggerKind::DrawdownLimit => Some(fields::ROLLING_MAX_DRAWDOWN),
        TriggerKind::LatencySpike => Some(fields::P99_LATENCY_MS),
        TriggerKind::ErrorRate => Some(fields::ERROR_RATE),
        TriggerKind::ExchangeFailure => Some(fields::CONSECUTIVE_EXCHANGE_FAILURES),
        TriggerKind::PositionTimeout => Some(fields::OLDEST_POSITION_AGE_SECS),
        TriggerKind::SystemOverload => Some(fields::CPU_UTILIZATION),
        TriggerKind::SecurityBreach => Some(fields::SECURITY_ALERT_COUNT),
        TriggerKind::DataCorruption => Some(fields::DATA_INTEGRITY_ERRORS),
        TriggerKind::Manual => None,
    }
}

/// Reads the value a trigger kind compares against its threshold.
fn observe(kind: TriggerKind, snapshot: &MetricsSnapshot) -> Result<Option<Decimal>, &'static str> {
    match kind {
        TriggerKind::Manual => Ok(None),
        TriggerKind::SystemOverload => {
            let cpu = snapshot.number(fields::CPU_UTILIZATION);
            let mem = snapshot.number(fields::MEMORY_UTILIZATION);
            match (cpu, mem) {
                (None, None) => Err(fields::CPU_UTILIZATION),
                (cpu, mem) => Ok(cpu.max(mem)),
            }
        }
        other => {
            let field = field_for(other).ok_or("unmapped")?;
            snapshot.number(field).map(Some).ok_or(field)
        }
    }
}

/// Checks whether `kind` at `threshold` trips against `snapshot`.
#[must_use]
pub fn check(kind: TriggerKind, threshold: Decimal, snapshot: &MetricsSnapshot) -> Verdict {
    match observe(kind, snapshot) {
        Ok(Some(observed)) if observed >= threshold => Verdict::Trip { observed },
        Ok(_) => Verdict::Hold,
        Err(field) => Verdict::Missing(field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_loss_threshold() {
        let snapshot = MetricsSnapshot::new().with_number(fields::DAILY_LOSS_RATIO, dec!(0.06));
        assert_eq!(
            check(TriggerKind::LossThreshold, dec!(0.05), &snapshot),
            Verdict::Trip {
                observed: dec!(0.06)
            }
        );
        assert_eq!(
            check(TriggerKind::LossThreshold, dec!(0.07), &snapshot),
            Verdict::Hold
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let snapshot = MetricsSnapshot::new().with_number(fields::ERROR_RATE, dec!(0.10));
        assert!(matches!(
            check(TriggerKind::ErrorRate, dec!(0.10), &snapshot),
            Verdict::Trip { .. }
        ));
    }

    #[test]
    fn test_system_overload_uses_worst_resource() {
        let snapshot = MetricsSnapshot::new()
            .with_number(fields::CPU_UTILIZATION, dec!(0.40))
            .with_number(fields::MEMORY_UTILIZATION, dec!(0.95));
        assert_eq!(
            check(TriggerKind::SystemOverload, dec!(0.90), &snapshot),
            Verdict::Trip {
                observed: dec!(0.95)
            }
        );

        let memory_only = MetricsSnapshot::new().with_number(fields::MEMORY_UTILIZATION, dec!(0.5));
        assert_eq!(
            check(TriggerKind::SystemOverload, dec!(0.90), &memory_only),
            Verdict::Hold
        );
    }

    #[test]
    fn test_missing_field() {
        let snapshot = MetricsSnapshot::new();
        assert_eq!(
            check(TriggerKind::LatencySpike, dec!(500), &snapshot),
            Verdict::Missing(fields::P99_LATENCY_MS)
        );
        assert_eq!(
            check(TriggerKind::SystemOverload, dec!(0.9), &snapshot),
            Verdict::Missing(fields::CPU_UTILIZATION)
        );
    }

    #[test]
    fn test_manual_never_trips() {
        let snapshot = MetricsSnapshot::new().with_number(fields::DAILY_LOSS_RATIO, dec!(1));
        assert_eq!(check(TriggerKind::Manual, dec!(0), &snapshot), Verdict::Hold);
    }

    #[test]
    fn test_security_flag() {
        let snapshot = MetricsSnapshot::new().with_flag(fields::SECURITY_ALERT_COUNT, true);
        assert!(matches!(
            check(TriggerKind::SecurityBreach, dec!(1), &snapshot),
            Verdict::Trip { .. }
        ));
    }
}
