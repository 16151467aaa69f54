// =============================================================================
// Report Builder — Telegram HTML report and console summary
// =============================================================================
//
// Layout of one message:
//
//   Binance Futures Long/Short (1d)
//   Run: 2024-05-01 08:00 UTC
//
//   BTCUSDT
//   Accounts 1d: long 75.00% / short 25.00% (3.00x)      <- highlighted
//   Positions 1d: n/a
//   Global 1d: long 50.00% / short 50.00% (1.00x)
//
//   Warnings:
//   - ETHUSDT: ...
//
// Highlighting is presentational only and never changes the order of pairs.
// =============================================================================

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::futures_intel::imbalance::{exceeds_threshold, imbalance_factor};
use crate::futures_intel::{LongShortMetric, PairSnapshot, HIGHLIGHT_THRESHOLD};
use crate::selector::TickerSummary;
use crate::types::MetricKind;

pub const REPORT_TITLE: &str = "Binance Futures Long/Short (1d)";

/// Pairs per Telegram message.
pub const BATCH_SIZE: usize = 10;

const HIGHLIGHT_MARKER: &str = "⚠️";

/// `label: long X.XX% / short Y.YY% (Z.ZZx)`, or `label: n/a`.
pub fn format_metric(label: &str, metric: Option<&LongShortMetric>) -> String {
    match metric {
        None => format!("{label}: n/a"),
        Some(m) => format!(
            "{label}: long {:.2}% / short {:.2}% ({:.2}x)",
            m.long_pct, m.short_pct, m.ratio
        ),
    }
}

fn metric_line(kind: MetricKind, metric: Option<&LongShortMetric>) -> String {
    let line = format_metric(kind.label(), metric);
    match metric {
        Some(m) if exceeds_threshold(imbalance_factor(m.ratio), HIGHLIGHT_THRESHOLD) => {
            format!("<b>{HIGHLIGHT_MARKER} {line}</b>")
        }
        _ => line,
    }
}

/// Render one message for `pairs` (already in display order).  `warnings`
/// are escaped and listed at the end when present.
pub fn build_message(run_at: DateTime<Utc>, pairs: &[PairSnapshot], warnings: &[String]) -> String {
    let mut lines = vec![
        REPORT_TITLE.to_string(),
        format!("Run: {}", run_at.format("%Y-%m-%d %H:%M UTC")),
    ];

    for pair in pairs {
        lines.push(String::new());
        lines.push(escape_html(&pair.symbol));
        for kind in MetricKind::ALL {
            lines.push(metric_line(kind, pair.metric(kind)));
        }
    }

    if !warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        lines.extend(warnings.iter().map(|w| format!("- {}", escape_html(w))));
    }

    lines.join("\n")
}

/// Split `pairs` into messages of `batch_size` pairs.  With more than one
/// message, ` (part i/N)` is appended to each message's first line.
pub fn build_batches(run_at: DateTime<Utc>, pairs: &[PairSnapshot], batch_size: usize) -> Vec<String> {
    let batch_size = batch_size.max(1);
    let batches: Vec<&[PairSnapshot]> = pairs.chunks(batch_size).collect();
    let total = batches.len();

    batches
        .into_iter()
        .enumerate()
        .map(|(idx, batch)| {
            let msg = build_message(run_at, batch, &[]);
            if total > 1 {
                with_part_suffix(&msg, idx + 1, total)
            } else {
                msg
            }
        })
        .collect()
}

fn with_part_suffix(msg: &str, part: usize, total: usize) -> String {
    match msg.split_once('\n') {
        Some((first, rest)) => format!("{first} (part {part}/{total})\n{rest}"),
        None => format!("{msg} (part {part}/{total})"),
    }
}

/// Warning used when a scan finds nothing above the threshold.
pub fn no_highlight_warning(candidates: usize) -> String {
    format!("No symbols exceed {HIGHLIGHT_THRESHOLD:.1}x among top {candidates} by volume")
}

/// Plain-text summary of the most skewed pairs for the terminal.
pub fn format_console_report(pairs: &[PairSnapshot], tickers: &HashMap<String, TickerSummary>) -> String {
    let mut out = String::from("Top long/short skews (USDT perpetual):");
    for pair in pairs {
        let ratio = |kind: MetricKind| {
            pair.metric(kind)
                .map_or_else(|| "n/a".to_string(), |m| format!("{:.2}", m.ratio))
        };
        let _ = write!(
            out,
            "\n- {}: max skew {:.2}x (accounts={} positions={} global={})",
            pair.symbol,
            pair.max_imbalance(),
            ratio(MetricKind::Accounts),
            ratio(MetricKind::Positions),
            ratio(MetricKind::Global),
        );
        if let Some(t) = tickers.get(&pair.symbol) {
            let _ = write!(out, " last={} 24h={:+.2}%", t.last_price, t.change_pct);
        }
    }
    out
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
