// =============================================================================
// Metric Collection — per-symbol fan-in with failure isolation
// =============================================================================
//
// Symbols are processed one after another.  For each symbol the three ratio
// feeds are requested independently; whatever succeeds goes into the
// snapshot.  A symbol contributes:
//
//   - a snapshot when at least one feed succeeded
//   - one error line `SYMBOL: ...` when at least one feed failed
//
// so a symbol whose feeds all failed is reported and left out of scoring.
// Nothing here aborts the batch.
// =============================================================================

use tracing::{info, warn};

use crate::binance::client::MarketDataClient;
use crate::futures_intel::PairSnapshot;
use crate::types::MetricKind;

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub snapshots: Vec<PairSnapshot>,
    pub errors: Vec<String>,
}

pub async fn collect_metrics(client: &mut MarketDataClient, symbols: &[String]) -> Collection {
    let mut out = Collection::default();
    let total = symbols.len();

    for (idx, symbol) in symbols.iter().enumerate() {
        let mut snapshot = PairSnapshot::new(symbol.clone());
        let mut failures = Vec::new();

        for kind in MetricKind::ALL {
            match client.metric(kind, symbol).await {
                Ok(metric) => snapshot.set(kind, metric),
                Err(e) => {
                    warn!(symbol = %symbol, %kind, error = %e, "metric unavailable");
                    failures.push(format!("{kind}: {e}"));
                }
            }
        }

        let failed = !failures.is_empty();
        if failed {
            out.errors.push(format!("{symbol}: {}", failures.join("; ")));
        }
        if !snapshot.is_empty() {
            out.snapshots.push(snapshot);
        }

        info!(
            "[{}/{}] {} {}",
            idx + 1,
            total,
            symbol,
            if failed { "error" } else { "ok" }
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::fetcher::Fetcher;
    use crate::test_support::{fast_config, market_server};

    async fn client() -> MarketDataClient {
        let base = market_server().await;
        MarketDataClient::new(Fetcher::new(fast_config(vec![base])).unwrap())
    }

    #[tokio::test]
    async fn failing_symbol_does_not_abort_batch() {
        let mut c = client().await;
        let symbols = vec!["EMPTYUSDT".to_string(), "BTCUSDT".to_string()];
        let out = collect_metrics(&mut c, &symbols).await;

        assert_eq!(out.snapshots.len(), 1);
        assert_eq!(out.snapshots[0].symbol, "BTCUSDT");
        assert!(out.snapshots[0].accounts.is_some());
        assert!(out.snapshots[0].positions.is_some());
        assert!(out.snapshots[0].global.is_some());

        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].starts_with("EMPTYUSDT: "));
        assert!(out.errors[0].contains("no data"));
    }

    #[tokio::test]
    async fn partial_snapshot_is_kept() {
        let mut c = client().await;
        let out = collect_metrics(&mut c, &["HALFUSDT".to_string()]).await;

        assert_eq!(out.snapshots.len(), 1);
        let snap = &out.snapshots[0];
        assert!(snap.accounts.is_some());
        assert!(snap.positions.is_none());
        assert!(snap.global.is_none());
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("positions:"));
        assert!(out.errors[0].contains("global:"));
    }

    #[tokio::test]
    async fn empty_symbol_list() {
        let mut c = client().await;
        let out = collect_metrics(&mut c, &[]).await;
        assert!(out.snapshots.is_empty());
        assert!(out.errors.is_empty());
    }
}
