// =============================================================================
// Symbol Selector — bound the scan to the most liquid USDT perpetuals
// =============================================================================
//
// Scanning every listed contract costs three ratio requests per symbol, so the
// scan first ranks the tradable USDT perpetuals by 24h quote volume and keeps
// the top `candidate_count`.  An optional volume ceiling turns this into a
// search for thin markets instead.
// =============================================================================

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::binance::client::{MarketDataClient, MarketDataError};
use crate::types::Ticker24h;

/// Price context cached from the ticker snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickerSummary {
    pub quote_volume: f64,
    pub last_price: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Chosen symbols, highest quote volume first.
    pub symbols: Vec<String>,
    /// Ticker context for every chosen symbol.
    pub tickers: HashMap<String, TickerSummary>,
}

/// Rank `tickers` restricted to `allowed` by quote volume.  Entries with an
/// unparseable volume are skipped; equal volumes keep ticker order.
pub fn select_by_volume(
    allowed: &HashSet<String>,
    tickers: &[Ticker24h],
    candidate_count: usize,
    max_quote_volume: Option<f64>,
) -> Selection {
    let mut scored: Vec<(&Ticker24h, f64)> = tickers
        .iter()
        .filter(|t| allowed.contains(&t.symbol))
        .filter_map(|t| {
            let Some(vol) = t.quote_volume else {
                debug!(symbol = %t.symbol, "skipping ticker with unparseable volume");
                return None;
            };
            Some((t, vol))
        })
        .filter(|(_, vol)| max_quote_volume.map_or(true, |ceiling| *vol <= ceiling))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(candidate_count);

    let mut selection = Selection::default();
    for (ticker, vol) in scored {
        selection.symbols.push(ticker.symbol.clone());
        selection.tickers.insert(
            ticker.symbol.clone(),
            TickerSummary {
                quote_volume: vol,
                last_price: ticker.last_price.unwrap_or(0.0),
                change_pct: ticker.price_change_pct.unwrap_or(0.0),
            },
        );
    }
    selection
}

/// Top `candidate_count` tradable USDT perpetuals by 24h quote volume.
pub async fn top_by_volume(
    client: &mut MarketDataClient,
    candidate_count: usize,
    max_quote_volume: Option<f64>,
) -> Result<Selection, MarketDataError> {
    let allowed: HashSet<String> = client.usdt_perpetual_symbols().await?.into_iter().collect();
    let tickers = client.tickers_24h().await?;
    let selection = select_by_volume(&allowed, &tickers, candidate_count, max_quote_volume);

    info!(
        candidates = selection.symbols.len(),
        universe = allowed.len(),
        max_quote_volume = ?max_quote_volume,
        "candidates selected by volume"
    );
    Ok(selection)
}
