// =============================================================================
// Shared types used across the imbalance reporter
// =============================================================================

use serde::{Deserialize, Serialize};

/// Which of the three Binance long/short ratio feeds a metric came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Top traders, counted by account.
    Accounts,
    /// Top traders, weighted by position size.
    Positions,
    /// All accounts.
    Global,
}

impl MetricKind {
    /// Collection and rendering order.
    pub const ALL: [MetricKind; 3] = [Self::Accounts, Self::Positions, Self::Global];

    /// Futures data endpoint serving this ratio.
    pub fn path(self) -> &'static str {
        match self {
            Self::Accounts => "/futures/data/topLongShortAccountRatio",
            Self::Positions => "/futures/data/topLongShortPositionRatio",
            Self::Global => "/futures/data/globalLongShortAccountRatio",
        }
    }

    /// Label used in the chat report.
    pub fn label(self) -> &'static str {
        match self {
            Self::Accounts => "Accounts 1d",
            Self::Positions => "Positions 1d",
            Self::Global => "Global 1d",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accounts => write!(f, "accounts"),
            Self::Positions => write!(f, "positions"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// One row of the 24h ticker snapshot. Numeric fields are `None` when the
/// exchange sent something that does not parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub quote_volume: Option<f64>,
    pub last_price: Option<f64>,
    pub price_change_pct: Option<f64>,
}
