// =============================================================================
// Imbalance Scorer — symmetric skew factor and pair ranking
// =============================================================================
//
// The imbalance factor folds a long/short ratio onto [1, inf) so that a crowd
// leaning 3:1 long scores the same as one leaning 3:1 short:
//
//   factor = max(ratio, 1 / ratio)   for ratio > 0
//   factor = 0                       for a missing metric
//
// A pair scores the maximum factor across its three metrics.  Pairs strictly
// above `HIGHLIGHT_THRESHOLD` are flagged.

use super::long_short_ratio::LongShortMetric;
use super::PairSnapshot;

/// Factor above which a metric or pair is highlighted.  Strictly greater.
pub const HIGHLIGHT_THRESHOLD: f64 = 2.3;

pub fn imbalance_factor(ratio: f64) -> f64 {
    if ratio > 0.0 {
        ratio.max(1.0 / ratio)
    } else {
        0.0
    }
}

pub fn metric_imbalance(metric: Option<&LongShortMetric>) -> f64 {
    metric.map_or(0.0, |m| imbalance_factor(m.ratio))
}

pub fn exceeds_threshold(factor: f64, threshold: f64) -> bool {
    factor > threshold
}

/// Snapshots ordered by imbalance, and the subset above the threshold.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub sorted: Vec<PairSnapshot>,
    pub highlighted: Vec<PairSnapshot>,
}

/// Sort by pair imbalance, most skewed first.  The sort is stable, so equal
/// scores keep their input order.
pub fn sort_by_imbalance(pairs: &mut [PairSnapshot]) {
    pairs.sort_by(|a, b| b.max_imbalance().total_cmp(&a.max_imbalance()));
}

pub fn rank(mut pairs: Vec<PairSnapshot>, threshold: f64) -> Ranking {
    sort_by_imbalance(&mut pairs);
    let highlighted = pairs
        .iter()
        .filter(|p| exceeds_threshold(p.max_imbalance(), threshold))
        .cloned()
        .collect();
    Ranking {
        sorted: pairs,
        highlighted,
    }
}
