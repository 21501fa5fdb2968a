//! Historical valuation-ratio engine.
//!
//! Pure computation over already-fetched data: aligning disclosures with
//! prices, ratio derivation, outlier filtering, summary statistics, the
//! dividend-yield channel and P/E based fair value. Nothing here performs I/O.

pub mod align;
pub mod dividend;
pub mod extract;
pub mod fair_value;
pub mod ratios;
pub mod stats;

use crate::config::RatioPolicy;
use crate::models::{
    FundamentalReport, Granularity, PricePoint, RatioKind, RatioSummary, Unavailable,
};
use std::collections::BTreeMap;

/// Ratio series → plausibility filter → summary, for each requested kind.
/// Every kind in `kinds` gets an entry.
pub fn summarize_history(
    prices: &[PricePoint],
    reports: &[FundamentalReport],
    granularity: Granularity,
    kinds: &[RatioKind],
    policy: &RatioPolicy,
) -> BTreeMap<RatioKind, Result<RatioSummary, Unavailable>> {
    let mut series = ratios::compute_ratio_series(prices, reports, granularity, kinds);

    kinds
        .iter()
        .map(|&kind| {
            let outcome = match series.remove(&kind) {
                Some(s) => stats::summarize(
                    &s,
                    policy.bound(kind),
                    policy.summary,
                    policy.min_observations(),
                ),
                None => Err(Unavailable::missing(format!(
                    "no {} periods with a positive denominator ({} reports)",
                    kind,
                    granularity.as_str()
                ))),
            };
            (kind, outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatioBounds;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_monthly_prices_single_report_median() {
        let prices = vec![
            PricePoint::new(d(2024, 1, 1), 100.0),
            PricePoint::new(d(2024, 2, 1), 110.0),
            PricePoint::new(d(2024, 3, 1), 120.0),
        ];
        let reports = vec![FundamentalReport::new(d(2024, 1, 1)).with("DilutedEPS", 5.0)];

        let policy = RatioPolicy::default();
        let out =
            summarize_history(&prices, &reports, Granularity::Annual, &[RatioKind::Pe], &policy);
        let pe = out[&RatioKind::Pe].as_ref().unwrap();
        assert_eq!(pe.central, 22.0);
        assert_eq!(pe.observations, 3);
    }

    #[test]
    fn test_alternating_eps_uses_only_positive_periods() {
        for cap in [150.0, 200.0] {
            let policy = RatioPolicy {
                bounds: RatioBounds { pe: cap, ..RatioBounds::default() },
                ..RatioPolicy::default()
            };
            // EPS alternates $2 / -$1 by period; price constant at 40.
            let mut reports = Vec::new();
            let mut prices = Vec::new();
            for (i, year) in (2016..2024).enumerate() {
                let eps = if i % 2 == 0 { 2.0 } else { -1.0 };
                reports.push(FundamentalReport::new(d(year, 1, 1)).with("DilutedEPS", eps));
                for month in [3, 6, 9] {
                    prices.push(PricePoint::new(d(year, month, 1), 40.0));
                }
            }

            let kinds = [RatioKind::Pe];
            let out = summarize_history(&prices, &reports, Granularity::Annual, &kinds, &policy);
            let pe = out[&RatioKind::Pe].as_ref().unwrap();
            assert_eq!(pe.central, 20.0);
            assert_eq!((pe.p5, pe.p95), (20.0, 20.0));
            // four positive-EPS years, three months each
            assert_eq!(pe.observations, 12);
        }
    }

    #[test]
    fn test_every_requested_kind_reported() {
        let prices = vec![PricePoint::new(d(2024, 1, 1), 100.0)];
        let policy = RatioPolicy::default();
        let out = summarize_history(&prices, &[], Granularity::Quarterly, &RatioKind::ALL, &policy);
        assert_eq!(out.len(), 4);
        assert!(out.values().all(|r| matches!(r, Err(Unavailable::MissingData(_)))));
    }
}
