//! Per-period valuation ratios from aligned price + fundamentals.

use crate::models::{FundamentalReport, Granularity, PricePoint, RatioKind, RatioPoint, RatioSeries};
use crate::valuation::align::align;
use crate::valuation::extract::Metric;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Four quarters must span no more than this, or the window has a hole in it.
const MAX_TTM_SPAN_DAYS: i64 = 320;

/// Fundamentals in force from one report date onward. Flows are trailing twelve
/// months; stock quantities are as of the report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailingFundamentals {
    pub eps_ttm: Option<f64>,
    pub revenue_ttm: Option<f64>,
    pub ebitda_ttm: Option<f64>,
    pub shares: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub total_debt: Option<f64>,
    pub cash: Option<f64>,
}

impl TrailingFundamentals {
    fn book_value(&self) -> Option<f64> {
        Some(self.total_assets? - self.total_liabilities?)
    }
}

/// Build the trailing snapshot in force after each report, ascending by date.
pub fn trailing_fundamentals(
    reports: &[FundamentalReport],
    granularity: Granularity,
) -> Vec<(NaiveDate, TrailingFundamentals)> {
    let mut sorted: Vec<&FundamentalReport> = reports.iter().collect();
    sorted.sort_by_key(|r| r.effective_date);

    sorted
        .iter()
        .enumerate()
        .map(|(i, report)| {
            let flow = |metric: Metric| match granularity {
                Granularity::Annual => metric.extract(report),
                Granularity::Quarterly => ttm_sum(&sorted, i, metric),
            };

            let snapshot = TrailingFundamentals {
                eps_ttm: flow(Metric::Eps),
                revenue_ttm: flow(Metric::Revenue),
                ebitda_ttm: flow(Metric::Ebitda),
                shares: Metric::Shares.extract(report),
                total_assets: Metric::TotalAssets.extract(report),
                total_liabilities: Metric::TotalLiabilities.extract(report),
                total_debt: Metric::TotalDebt.extract(report),
                cash: Metric::Cash.extract(report),
            };
            (report.effective_date, snapshot)
        })
        .collect()
}

/// Sum of the metric over reports `end-3..=end`; undefined when fewer than four
/// quarters exist, any is missing, or they do not fit in one year.
fn ttm_sum(sorted: &[&FundamentalReport], end: usize, metric: Metric) -> Option<f64> {
    if end < 3 {
        return None;
    }
    let window = &sorted[end - 3..=end];
    let span = (window[3].effective_date - window[0].effective_date).num_days();
    if span > MAX_TTM_SPAN_DAYS {
        return None;
    }
    window
        .iter()
        .map(|r| metric.extract(r))
        .sum::<Option<f64>>()
}

fn positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

/// Ratio for one period, or `None` when any input is missing or the
/// denominator is not strictly positive.
pub fn ratio_for(kind: RatioKind, price: f64, f: &TrailingFundamentals) -> Option<f64> {
    let price = positive(price)?;
    let value = match kind {
        RatioKind::Pe => price / positive(f.eps_ttm?)?,
        RatioKind::Ps => {
            let shares = positive(f.shares?)?;
            price / positive(f.revenue_ttm? / shares)?
        }
        RatioKind::Pb => {
            let shares = positive(f.shares?)?;
            price / positive(f.book_value()? / shares)?
        }
        RatioKind::EvEbitda => {
            let shares = positive(f.shares?)?;
            let ev = price * shares + f.total_debt? - f.cash?;
            ev / positive(f.ebitda_ttm?)?
        }
    };
    value.is_finite().then_some(value)
}

/// Compute every requested ratio over the price series. Kinds that produce no
/// rows are omitted from the map entirely.
pub fn compute_ratio_series(
    prices: &[PricePoint],
    reports: &[FundamentalReport],
    granularity: Granularity,
    kinds: &[RatioKind],
) -> BTreeMap<RatioKind, RatioSeries> {
    let snapshots = trailing_fundamentals(reports, granularity);
    let aligned = align(prices, &snapshots);

    let mut out = BTreeMap::new();
    for &kind in kinds {
        let mut series = RatioSeries::new(kind);
        for rec in &aligned {
            let Some(snapshot) = rec.value else { continue };
            if let Some(value) = ratio_for(kind, rec.price, snapshot) {
                series.points.push(RatioPoint { date: rec.date, value });
            }
        }
        if !series.is_empty() {
            out.insert(kind, series);
        }
    }
    out
}

/// Most recent defined EPS_ttm.
pub fn latest_eps_ttm(reports: &[FundamentalReport], granularity: Granularity) -> Option<f64> {
    trailing_fundamentals(reports, granularity)
        .into_iter()
        .rev()
        .find_map(|(_, f)| f.eps_ttm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn quarter(date: NaiveDate, eps: f64) -> FundamentalReport {
        FundamentalReport::new(date).with("DilutedEPS", eps)
    }

    #[test]
    fn test_scenario_single_annual_report() {
        let prices = vec![
            PricePoint::new(d(2024, 1, 1), 100.0),
            PricePoint::new(d(2024, 2, 1), 110.0),
            PricePoint::new(d(2024, 3, 1), 120.0),
        ];
        let reports = vec![FundamentalReport::new(d(2024, 1, 1)).with("DilutedEPS", 5.0)];

        let series = compute_ratio_series(&prices, &reports, Granularity::Annual, &[RatioKind::Pe]);
        assert_eq!(series[&RatioKind::Pe].values(), vec![20.0, 22.0, 24.0]);
    }

    #[test]
    fn test_quarterly_eps_is_rolling_four_quarter_sum() {
        let reports = vec![
            quarter(d(2023, 3, 31), 1.0),
            quarter(d(2023, 6, 30), 2.0),
            quarter(d(2023, 9, 30), 3.0),
            quarter(d(2023, 12, 31), 4.0),
            quarter(d(2024, 3, 31), 5.0),
        ];
        let snaps = trailing_fundamentals(&reports, Granularity::Quarterly);
        let eps: Vec<Option<f64>> = snaps.iter().map(|(_, f)| f.eps_ttm).collect();
        assert_eq!(eps, vec![None, None, None, Some(10.0), Some(14.0)]);
        assert_eq!(latest_eps_ttm(&reports, Granularity::Quarterly), Some(14.0));
    }

    #[test]
    fn test_quarterly_gap_breaks_ttm() {
        let reports = vec![
            quarter(d(2022, 3, 31), 1.0),
            quarter(d(2022, 6, 30), 1.0),
            quarter(d(2023, 9, 30), 1.0),
            quarter(d(2023, 12, 31), 1.0),
        ];
        let snaps = trailing_fundamentals(&reports, Granularity::Quarterly);
        assert_eq!(snaps[3].1.eps_ttm, None);
    }

    #[test]
    fn test_negative_eps_period_dropped() {
        let prices = vec![
            PricePoint::new(d(2021, 6, 1), 40.0),
            PricePoint::new(d(2022, 6, 1), 40.0),
        ];
        let reports = vec![
            FundamentalReport::new(d(2021, 1, 1)).with("DilutedEPS", 2.0),
            FundamentalReport::new(d(2022, 1, 1)).with("DilutedEPS", -1.0),
        ];
        let series = compute_ratio_series(&prices, &reports, Granularity::Annual, &[RatioKind::Pe]);
        assert_eq!(series[&RatioKind::Pe].values(), vec![20.0]);
    }

    #[test]
    fn test_all_four_kinds() {
        let report = FundamentalReport::new(d(2023, 12, 31))
            .with("DilutedEPS", 4.0)
            .with("TotalRevenue", 1_000.0)
            .with("OrdinarySharesNumber", 100.0)
            .with("TotalAssets", 2_000.0)
            .with("TotalLiabilitiesNetMinorityInterest", 1_500.0)
            .with("TotalDebt", 300.0)
            .with("CashAndCashEquivalents", 100.0)
            .with("EBITDA", 200.0);
        let prices = vec![PricePoint::new(d(2024, 1, 31), 40.0)];

        let s = compute_ratio_series(&prices, &[report], Granularity::Annual, &RatioKind::ALL);
        assert_eq!(s[&RatioKind::Pe].values(), vec![10.0]);
        assert_eq!(s[&RatioKind::Ps].values(), vec![4.0]);
        assert_eq!(s[&RatioKind::Pb].values(), vec![8.0]);
        // (40 * 100 + 300 - 100) / 200
        assert_eq!(s[&RatioKind::EvEbitda].values(), vec![21.0]);
    }

    #[test]
    fn test_kind_omitted_when_input_missing_everywhere() {
        let reports = vec![FundamentalReport::new(d(2023, 12, 31)).with("DilutedEPS", 4.0)];
        let prices = vec![PricePoint::new(d(2024, 1, 31), 40.0)];

        let s = compute_ratio_series(&prices, &reports, Granularity::Annual, &RatioKind::ALL);
        assert_eq!(s.keys().copied().collect::<Vec<_>>(), vec![RatioKind::Pe]);
    }

    #[test]
    fn test_negative_book_value_dropped() {
        let f = TrailingFundamentals {
            shares: Some(10.0),
            total_assets: Some(100.0),
            total_liabilities: Some(150.0),
            ..Default::default()
        };
        assert_eq!(ratio_for(RatioKind::Pb, 10.0, &f), None);
        assert_eq!(ratio_for(RatioKind::Pe, 10.0, &f), None);
    }

    #[test]
    fn test_periods_before_first_report_dropped() {
        let prices = vec![
            PricePoint::new(d(2023, 1, 1), 10.0),
            PricePoint::new(d(2023, 6, 1), 12.0),
        ];
        let reports = vec![FundamentalReport::new(d(2023, 3, 31)).with("BasicEPS", 1.0)];
        let s = compute_ratio_series(&prices, &reports, Granularity::Annual, &[RatioKind::Pe]);
        assert_eq!(s[&RatioKind::Pe].points, vec![RatioPoint { date: d(2023, 6, 1), value: 12.0 }]);
    }
}
