// =============================================================================
// Runs — the scheduled pair report and the volume-ranked imbalance scan
// =============================================================================
//
// Both runs share one shape:
//
//   symbols -> collect_metrics -> rank -> build message(s) -> deliver
//
// A run with zero snapshots fails before anything is sent.  The report run
// delivers its single message itself; the scan run only renders, so the
// caller can show the console summary before sending (or skip sending).
// =============================================================================

use std::collections::HashMap;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::binance::client::MarketDataClient;
use crate::collector::collect_metrics;
use crate::futures_intel::{rank, PairSnapshot, HIGHLIGHT_THRESHOLD};
use crate::report::{build_batches, build_message, no_highlight_warning, BATCH_SIZE};
use crate::selector::{top_by_volume, TickerSummary};
use crate::telegram::TelegramClient;

/// Where finished messages go.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub telegram: &'a TelegramClient,
    pub chat_id: &'a str,
}

impl Delivery<'_> {
    /// Send `messages` in order, stopping at the first failure.
    pub async fn send_all(&self, messages: &[String]) -> anyhow::Result<()> {
        let total = messages.len();
        for (idx, text) in messages.iter().enumerate() {
            self.telegram
                .send_message(self.chat_id, text)
                .await
                .with_context(|| format!("failed to send message {}/{}", idx + 1, total))?;
        }
        info!(messages = total, "report delivered");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReportRun {
    pub pairs: Vec<PairSnapshot>,
    pub errors: Vec<String>,
    pub message: String,
}

/// Report on a fixed list of pairs.  Per-symbol failures become warnings
/// in the message.
pub async fn run_report(
    client: &mut MarketDataClient,
    pairs: &[String],
    delivery: Option<Delivery<'_>>,
    run_at: DateTime<Utc>,
) -> anyhow::Result<ReportRun> {
    let collection = collect_metrics(client, pairs).await;
    for err in &collection.errors {
        warn!("{err}");
    }
    if collection.snapshots.is_empty() {
        bail!(
            "no data collected for {} pair(s): {}",
            pairs.len(),
            collection.errors.join(" | ")
        );
    }

    let ranking = rank(collection.snapshots, HIGHLIGHT_THRESHOLD);
    let message = build_message(run_at, &ranking.sorted, &collection.errors);

    if let Some(d) = delivery {
        d.send_all(std::slice::from_ref(&message)).await?;
    }

    Ok(ReportRun {
        pairs: ranking.sorted,
        errors: collection.errors,
        message,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Pairs kept for the console summary.
    pub limit: usize,
    /// Pairs taken from the volume ranking.
    pub candidates: usize,
    pub max_quote_volume: Option<f64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            candidates: 120,
            max_quote_volume: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanRun {
    /// Most skewed pairs, at most `limit`.
    pub top: Vec<PairSnapshot>,
    pub highlighted: Vec<PairSnapshot>,
    pub tickers: HashMap<String, TickerSummary>,
    pub errors: Vec<String>,
    pub messages: Vec<String>,
}

/// Rank the most liquid USDT perpetuals by skew and render the messages:
/// highlighted pairs in batches, or a single report with a warning when none
/// qualify.  Nothing is sent; pass `messages` to [`Delivery::send_all`].
pub async fn run_scan(
    client: &mut MarketDataClient,
    opts: ScanOptions,
    run_at: DateTime<Utc>,
) -> anyhow::Result<ScanRun> {
    let selection = top_by_volume(client, opts.candidates, opts.max_quote_volume)
        .await
        .context("failed to select candidates by volume")?;
    if selection.symbols.is_empty() {
        bail!("no candidate symbols matched the volume filter");
    }

    let collection = collect_metrics(client, &selection.symbols).await;
    if collection.snapshots.is_empty() {
        bail!(
            "no data collected for {} candidate(s)",
            selection.symbols.len()
        );
    }

    let ranking = rank(collection.snapshots, HIGHLIGHT_THRESHOLD);
    let messages = if ranking.highlighted.is_empty() {
        vec![build_message(run_at, &[], &[no_highlight_warning(opts.candidates)])]
    } else {
        build_batches(run_at, &ranking.highlighted, BATCH_SIZE)
    };
    info!(
        scored = ranking.sorted.len(),
        highlighted = ranking.highlighted.len(),
        messages = messages.len(),
        "scan ranked"
    );

    let mut top = ranking.sorted;
    top.truncate(opts.limit);
    Ok(ScanRun {
        top,
        highlighted: ranking.highlighted,
        tickers: selection.tickers,
        errors: collection.errors,
        messages,
    })
}
