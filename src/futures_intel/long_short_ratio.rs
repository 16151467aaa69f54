// =============================================================================
// Long/Short Ratio — parsed crowd positioning metric
// =============================================================================
//
// Binance publishes the long/short ratio as a decimal string.  The long and
// short shares are derived from it rather than read from the record, so that
// they always add up to exactly 100:
//
//   long%  = ratio / (1 + ratio) * 100
//   short% = 100 - long%
//
//   ratio 1.0 => 50/50,  ratio 3.0 => 75/25,  ratio 0.5 => 33.3/66.7

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::binance::client::parse_decimal;

/// A record that lacks a usable `longShortRatio`.  The raw record is kept
/// for diagnostics.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid record: {record}")]
pub struct InvalidRecord {
    pub record: String,
}

/// One parsed long/short observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongShortMetric {
    /// Raw long/short ratio, always > 0.
    pub ratio: f64,

    /// Share of the long side (0-100).
    pub long_pct: f64,

    /// Share of the short side, `100 - long_pct`.
    pub short_pct: f64,

    /// Observation time, when the record carried one.
    pub timestamp: Option<DateTime<Utc>>,
}

impl LongShortMetric {
    /// Derive the metric from a ratio.  `None` unless the ratio is finite and
    /// strictly positive.
    pub fn from_ratio(ratio: f64) -> Option<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return None;
        }
        let long_pct = ratio / (1.0 + ratio) * 100.0;
        Some(Self {
            ratio,
            long_pct,
            short_pct: 100.0 - long_pct,
            timestamp: None,
        })
    }

    /// Parse a raw Binance ratio record (`longShortRatio`, `timestamp` in ms).
    pub fn from_record(record: &Value) -> Result<Self, InvalidRecord> {
        let invalid = || InvalidRecord {
            record: record.to_string(),
        };

        let ratio = record
            .get("longShortRatio")
            .and_then(parse_decimal)
            .ok_or_else(invalid)?;
        let mut metric = Self::from_ratio(ratio).ok_or_else(invalid)?;

        metric.timestamp = record
            .get("timestamp")
            .and_then(|ts| ts.as_i64().or_else(|| ts.as_f64().map(|f| f as i64)))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shares_always_sum_to_hundred() {
        for ratio in [0.01, 0.5, 1.0, 1.7, 2.3, 3.0, 42.0, 1e6] {
            let m = LongShortMetric::from_ratio(ratio).unwrap();
            assert!((m.long_pct + m.short_pct - 100.0).abs() < 1e-9);
            assert!((m.long_pct - ratio / (1.0 + ratio) * 100.0).abs() < 1e-12);
        }
    }

    #[test]
    fn balanced_ratio_is_fifty_fifty() {
        let m = LongShortMetric::from_ratio(1.0).unwrap();
        assert!((m.long_pct - 50.0).abs() < f64::EPSILON);
        assert!((m.short_pct - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_positive_ratios() {
        assert!(LongShortMetric::from_ratio(0.0).is_none());
        assert!(LongShortMetric::from_ratio(-1.0).is_none());
        assert!(LongShortMetric::from_ratio(f64::INFINITY).is_none());
    }

    #[test]
    fn parses_string_ratio_and_timestamp() {
        let rec = json!({
            "symbol": "BTCUSDT",
            "longShortRatio": "1.5000",
            "longAccount": "0.6000",
            "shortAccount": "0.4000",
            "timestamp": 1_700_000_000_000i64
        });
        let m = LongShortMetric::from_record(&rec).unwrap();
        assert!((m.ratio - 1.5).abs() < 1e-12);
        assert!((m.long_pct - 60.0).abs() < 1e-9);
        assert_eq!(m.timestamp.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn numeric_ratio_without_timestamp() {
        let m = LongShortMetric::from_record(&json!({ "longShortRatio": 2 })).unwrap();
        assert!((m.ratio - 2.0).abs() < 1e-12);
        assert!(m.timestamp.is_none());
    }

    #[test]
    fn malformed_records_keep_raw_content() {
        let err = LongShortMetric::from_record(&json!({ "longShortRatio": "not-a-number" })).unwrap_err();
        assert!(err.record.contains("not-a-number"));
        assert!(err.to_string().starts_with("invalid record: "));

        assert!(LongShortMetric::from_record(&json!({ "timestamp": 1 })).is_err());
        assert!(LongShortMetric::from_record(&json!({ "longShortRatio": null })).is_err());
        assert!(LongShortMetric::from_record(&json!({ "longShortRatio": "0" })).is_err());
    }
}
