//! Outlier filtering and summary statistics for ratio series.

use crate::models::{PlausibilityBound, RatioSeries, RatioSummary, SummaryPolicy, Unavailable};

/// Drop every point outside the bound.
pub fn filter_plausible(series: &RatioSeries, bound: PlausibilityBound) -> RatioSeries {
    RatioSeries {
        kind: series.kind,
        points: series
            .points
            .iter()
            .copied()
            .filter(|p| bound.contains(p.value))
            .collect(),
    }
}

/// Linear-interpolated percentile of an ascending, non-empty slice. `q` in [0, 1].
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn median(sorted: &[f64]) -> f64 {
    percentile(sorted, 0.5)
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Filter `values` through `bound` and reduce the survivors.
pub fn summarize_values(
    values: &[f64],
    bound: PlausibilityBound,
    policy: SummaryPolicy,
    min_observations: usize,
) -> Result<RatioSummary, Unavailable> {
    let kept = values.iter().copied().filter(|v| bound.contains(*v)).collect();
    reduce(kept, policy, min_observations)
}

pub fn summarize(
    series: &RatioSeries,
    bound: PlausibilityBound,
    policy: SummaryPolicy,
    min_observations: usize,
) -> Result<RatioSummary, Unavailable> {
    reduce(filter_plausible(series, bound).values(), policy, min_observations)
}

fn reduce(
    mut kept: Vec<f64>,
    policy: SummaryPolicy,
    min_observations: usize,
) -> Result<RatioSummary, Unavailable> {
    let need = min_observations.max(1);
    if kept.len() < need {
        return Err(Unavailable::InsufficientHistory {
            have: kept.len(),
            need,
        });
    }
    kept.sort_by(f64::total_cmp);

    let central = match policy {
        SummaryPolicy::Robust => median(&kept),
        SummaryPolicy::LegacyMean => mean(&kept),
    };

    Ok(RatioSummary {
        central,
        p5: percentile(&kept, 0.05),
        p95: percentile(&kept, 0.95),
        policy,
        observations: kept.len(),
    })
}
