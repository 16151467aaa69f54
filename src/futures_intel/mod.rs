// =============================================================================
// Futures Intelligence Module
// =============================================================================
//
// Crowd positioning from the Binance futures data endpoints.  Three
// independent ratio feeds are combined into one `PairSnapshot` per symbol:
//
//   1. Accounts:  top traders by account count
//   2. Positions: top traders by position size
//   3. Global:    every account
//
// Each feed is fetched separately, so a snapshot may be partial.  The
// imbalance scorer ranks snapshots by their most skewed feed.

pub mod imbalance;
pub mod long_short_ratio;

pub use imbalance::{rank, Ranking, HIGHLIGHT_THRESHOLD};
pub use long_short_ratio::{InvalidRecord, LongShortMetric};

use serde::{Deserialize, Serialize};

use crate::types::MetricKind;

/// All ratio metrics collected for a single symbol in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSnapshot {
    pub symbol: String,
    pub accounts: Option<LongShortMetric>,
    pub positions: Option<LongShortMetric>,
    pub global: Option<LongShortMetric>,
}

impl PairSnapshot {
    /// Create a blank snapshot for `symbol`.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            accounts: None,
            positions: None,
            global: None,
        }
    }

    pub fn metric(&self, kind: MetricKind) -> Option<&LongShortMetric> {
        match kind {
            MetricKind::Accounts => self.accounts.as_ref(),
            MetricKind::Positions => self.positions.as_ref(),
            MetricKind::Global => self.global.as_ref(),
        }
    }

    pub fn set(&mut self, kind: MetricKind, metric: LongShortMetric) {
        let slot = match kind {
            MetricKind::Accounts => &mut self.accounts,
            MetricKind::Positions => &mut self.positions,
            MetricKind::Global => &mut self.global,
        };
        *slot = Some(metric);
    }

    /// `true` when none of the three metrics is present.
    pub fn is_empty(&self) -> bool {
        MetricKind::ALL.iter().all(|k| self.metric(*k).is_none())
    }

    /// Highest imbalance factor across the three metrics (0 when empty).
    pub fn max_imbalance(&self) -> f64 {
        MetricKind::ALL
            .iter()
            .map(|k| imbalance::metric_imbalance(self.metric(*k)))
            .fold(0.0, f64::max)
    }
}
