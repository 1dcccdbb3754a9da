//! Point-in-time operational metrics fed to the evaluator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conventional field names read by the trigger predicates.
pub mod fields {
    /// Today's loss as a fraction of starting equity.
    pub const DAILY_LOSS_RATIO: &str = "dailyLossRatio";
    /// Rolling maximum drawdown as a fraction.
    pub const ROLLING_MAX_DRAWDOWN: &str = "rollingMaxDrawdown";
    /// 99th percentile request latency in milliseconds.
    pub const P99_LATENCY_MS: &str = "p99LatencyMs";
    /// Fraction of failed requests.
    pub const ERROR_RATE: &str = "errorRate";
    /// Consecutive failed exchange calls.
    pub const CONSECUTIVE_EXCHANGE_FAILURES: &str = "consecutiveExchangeFailures";
    /// Age of the oldest open position in seconds.
    pub const OLDEST_POSITION_AGE_SECS: &str = "oldestOpenPositionAgeSecs";
    /// CPU utilization fraction.
    pub const CPU_UTILIZATION: &str = "cpuUtilization";
    /// Memory utilization fraction.
    pub const MEMORY_UTILIZATION: &str = "memoryUtilization";
    /// Number of open security alerts.
    pub const SECURITY_ALERT_COUNT: &str = "securityAlertCount";
    /// Number of data integrity errors.
    pub const DATA_INTEGRITY_ERRORS: &str = "dataIntegrityErrorCount";
}

/// A single metric reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(Decimal),
    Flag(bool),
}

impl MetricValue {
    /// Numeric view of the value; flags read as 1 or 0.
    #[must_use]
    pub fn as_decimal(self) -> Decimal {
        match self {
            Self::Number(value) => value,
            Self::Flag(true) => Decimal::ONE,
            Self::Flag(false) => Decimal::ZERO,
        }
    }
}

/// Snapshot of named metric fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken.
    #[serde(default = "Utc::now")]
    pub taken_at: DateTime<Utc>,
    /// Field values by name.
    #[serde(default)]
    pub fields: BTreeMap<String, MetricValue>,
}

impl MetricsSnapshot {
    /// Creates an empty snapshot stamped now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            taken_at: Utc::now(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a numeric field.
    #[must_use]
    pub fn with_number(mut self, name: impl Into<String>, value: Decimal) -> Self {
        self.fields.insert(name.into(), MetricValue::Number(value));
        self
    }

    /// Sets a boolean field.
    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.fields.insert(name.into(), MetricValue::Flag(value));
        self
    }

    /// Sets the snapshot timestamp.
    #[must_use]
    pub fn taken_at(mut self, at: DateTime<Utc>) -> Self {
        self.taken_at = at;
        self
    }

    /// Reads a field as a decimal.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<Decimal> {
        self.fields.get(name).map(|v| v.as_decimal())
    }
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_snapshot_accessors() {
        let snapshot = MetricsSnapshot::new()
            .with_number(fields::DAILY_LOSS_RATIO, dec!(0.06))
            .with_flag("exchangeDown", true);

        assert_eq!(snapshot.number(fields::DAILY_LOSS_RATIO), Some(dec!(0.06)));
        assert_eq!(snapshot.number("exchangeDown"), Some(Decimal::ONE));
        assert_eq!(snapshot.number(fields::ERROR_RATE), None);
    }

    #[test]
    fn test_snapshot_from_json() {
        let snapshot: MetricsSnapshot = serde_json::from_str(
            r#"{"fields": {"dailyLossRatio": 0.06, "maintenance": false}}"#,
        )
        .unwrap();

        assert_eq!(snapshot.number("dailyLossRatio"), Some(dec!(0.06)));
        assert_eq!(snapshot.number("maintenance"), Some(Decimal::ZERO));
    }
}
