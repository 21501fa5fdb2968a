//! Dividend-yield channel: the historical yield range turned into buy / fair /
//! sell reference prices for the current trailing dividend.

use crate::config::DividendPolicy;
use crate::models::{
    Classification, DividendChannel, DividendEvent, PricePoint, ReferencePrices, SummaryPolicy,
    Unavailable, YieldBand,
};
use crate::valuation::stats::summarize_values;
use chrono::{Days, NaiveDate};

const TRAILING_WINDOW_DAYS: usize = 365;

/// Residue from the running sum below this is treated as no dividend.
const ZERO_EPSILON: f64 = 1e-9;

/// Trailing 365-day dividend total for every calendar day in `[start, end]`,
/// with non-event days counting as zero. Days before a full window has elapsed
/// since `start` are `None`.
pub fn trailing_dividends(
    events: &[DividendEvent],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<(NaiveDate, Option<f64>)> {
    if end < start {
        return Vec::new();
    }
    let days = (end - start).num_days() as usize + 1;

    let mut daily = vec![0.0; days];
    for e in events {
        if e.ex_date < start || e.ex_date > end || !e.amount.is_finite() {
            continue;
        }
        daily[(e.ex_date - start).num_days() as usize] += e.amount;
    }

    let mut out = Vec::with_capacity(days);
    let mut running = 0.0;
    for (i, amount) in daily.iter().enumerate() {
        running += amount;
        if i >= TRAILING_WINDOW_DAYS {
            running -= daily[i - TRAILING_WINDOW_DAYS];
        }
        let date = start + Days::new(i as u64);
        let value = (i + 1 >= TRAILING_WINDOW_DAYS)
            .then(|| if running.abs() < ZERO_EPSILON { 0.0 } else { running });
        out.push((date, value));
    }
    out
}

/// (date, trailing dividend / close) on every priced day with a defined trailing total.
pub fn yield_series(
    prices: &[PricePoint],
    trailing: &[(NaiveDate, Option<f64>)],
) -> Vec<(NaiveDate, f64)> {
    let Some(&(first, _)) = trailing.first() else {
        return Vec::new();
    };

    prices
        .iter()
        .filter(|p| p.close > 0.0 && p.close.is_finite())
        .filter_map(|p| {
            let offset = usize::try_from((p.date - first).num_days()).ok()?;
            let dividend = trailing.get(offset)?.1?;
            Some((p.date, dividend / p.close))
        })
        .collect()
}

pub fn reference_prices(trailing_dividend: f64, band: YieldBand) -> ReferencePrices {
    ReferencePrices {
        buy: trailing_dividend / band.high,
        fair: trailing_dividend / band.median,
        sell: trailing_dividend / band.low,
    }
}

pub fn classify(current_yield: f64, band: YieldBand, policy: &DividendPolicy) -> Classification {
    if current_yield >= policy.buy_threshold * band.high {
        Classification::Buy
    } else if current_yield <= policy.sell_threshold * band.low {
        Classification::Sell
    } else {
        Classification::Hold
    }
}

/// Build the channel from dividend events and a daily price history.
/// `history_start` is the first day the event list is complete from; the
/// calendar starts there, so a price has a yield once a full trailing year of
/// events lies on or after it.
pub fn dividend_channel(
    events: &[DividendEvent],
    prices: &[PricePoint],
    history_start: NaiveDate,
    policy: &DividendPolicy,
) -> Result<DividendChannel, Unavailable> {
    if events.is_empty() {
        return Err(Unavailable::missing("no dividend history"));
    }
    let mut prices = prices.to_vec();
    prices.sort_by_key(|p| p.date);
    let (Some(first_price), Some(last_price)) = (prices.first().copied(), prices.last().copied())
    else {
        return Err(Unavailable::missing("no price history"));
    };

    let trailing = trailing_dividends(events, history_start.min(first_price.date), last_price.date);

    let yields = yield_series(&prices, &trailing);
    let values: Vec<f64> = yields.iter().map(|(_, y)| *y).collect();
    let summary = summarize_values(
        &values,
        policy.bound(),
        SummaryPolicy::Robust,
        policy.min_observations(),
    )?;
    let band = YieldBand {
        low: summary.p5,
        median: summary.central,
        high: summary.p95,
    };

    let trailing_dividend = trailing
        .last()
        .and_then(|(_, v)| *v)
        .filter(|v| *v > 0.0)
        .ok_or_else(|| Unavailable::missing("no dividends in the trailing twelve months"))?;
    let current_yield = trailing_dividend / last_price.close;

    Ok(DividendChannel {
        band,
        current_yield,
        trailing_dividend,
        current_price: last_price.close,
        prices: reference_prices(trailing_dividend, band),
        classification: classify(current_yield, band, policy),
        observations: summary.observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn event(date: NaiveDate, amount: f64) -> DividendEvent {
        DividendEvent { ex_date: date, amount }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_reference_prices_from_band() {
        let band = YieldBand { low: 0.02, median: 0.04, high: 0.06 };
        let p = reference_prices(2.0, band);
        assert!(close(p.buy, 33.33));
        assert!(close(p.fair, 50.0));
        assert!(close(p.sell, 100.0));
        assert!(p.buy <= p.fair && p.fair <= p.sell);
    }

    #[test]
    fn test_reference_prices_order_follows_band_order() {
        for (low, median, high) in [(0.01, 0.02, 0.03), (0.02, 0.02, 0.02), (0.005, 0.03, 0.19)] {
            let p = reference_prices(1.7, YieldBand { low, median, high });
            assert!(p.buy <= p.fair && p.fair <= p.sell);
        }
    }

    #[test]
    fn test_classification_thresholds() {
        let policy = DividendPolicy::default();
        let band = YieldBand { low: 0.02, median: 0.04, high: 0.06 };
        assert_eq!(classify(0.057, band, &policy), Classification::Buy);
        assert_eq!(classify(0.056, band, &policy), Classification::Hold);
        assert_eq!(classify(0.022, band, &policy), Classification::Sell);
        assert_eq!(classify(0.0221, band, &policy), Classification::Hold);
    }

    #[test]
    fn test_trailing_window_zero_fills_and_rolls() {
        let events = [
            event(d(2020, 3, 1), 0.5),
            event(d(2020, 9, 1), 0.5),
            event(d(2021, 3, 1), 0.6),
        ];
        let t = trailing_dividends(&events, d(2020, 1, 1), d(2021, 6, 30));

        let at = |date: NaiveDate| t.iter().find(|(x, _)| *x == date).unwrap().1;
        assert_eq!(at(d(2020, 6, 1)), None);
        // 2020 is a leap year: 2020-12-30 is the 365th day
        assert_eq!(at(d(2020, 12, 30)), Some(1.0));
        assert_eq!(at(d(2021, 2, 28)), Some(1.0));
        // 2020-03-01 has rolled out, 2021-03-01 has rolled in
        assert!(close(at(d(2021, 3, 1)).unwrap(), 1.1));
        assert_eq!(t.len(), 547);
    }

    #[test]
    fn test_yield_series_uses_same_day_close() {
        let events = [event(d(2020, 1, 1), 2.0)];
        let trailing = trailing_dividends(&events, d(2020, 1, 1), d(2021, 1, 10));
        let prices = [PricePoint::new(d(2020, 2, 1), 50.0), PricePoint::new(d(2020, 12, 30), 40.0)];
        let y = yield_series(&prices, &trailing);
        assert_eq!(y, vec![(d(2020, 12, 30), 0.05)]);
    }

    #[test]
    fn test_channel_end_to_end() {
        // Quarterly $0.50 for six years; price oscillates between 40 and 60.
        let mut events = Vec::new();
        let mut prices = Vec::new();
        for year in 2015..=2020 {
            for month in [1, 4, 7, 10] {
                events.push(event(d(year, month, 15), 0.5));
            }
            for month in 1..=12 {
                let p = if month % 2 == 0 { 40.0 } else { 60.0 };
                prices.push(PricePoint::new(d(year, month, 20), p));
            }
        }

        let policy = DividendPolicy::default();
        let ch = dividend_channel(&events, &prices, d(2015, 1, 1), &policy).unwrap();
        assert!(close(ch.trailing_dividend, 2.0));
        assert!(close(ch.band.low, 2.0 / 60.0));
        assert!(close(ch.band.high, 0.05));
        assert_eq!(ch.current_price, 40.0);
        assert!(close(ch.current_yield, 0.05));
        assert_eq!(ch.classification, Classification::Buy);
        assert!(ch.prices.buy <= ch.prices.fair && ch.prices.fair <= ch.prices.sell);
    }

    #[test]
    fn test_no_dividends_is_unavailable() {
        let prices = [PricePoint::new(d(2020, 1, 1), 10.0)];
        let policy = DividendPolicy::default();
        let err = dividend_channel(&[], &prices, d(2020, 1, 1), &policy).unwrap_err();
        assert!(matches!(err, Unavailable::MissingData(_)));
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let events = [event(d(2024, 1, 10), 1.0)];
        let prices = [
            PricePoint::new(d(2024, 1, 10), 10.0),
            PricePoint::new(d(2024, 3, 10), 11.0),
        ];
        let policy = DividendPolicy::default();
        let err = dividend_channel(&events, &prices, d(2024, 1, 10), &policy).unwrap_err();
        assert!(matches!(err, Unavailable::InsufficientHistory { have: 0, .. }));
    }

    fn oscillating_history() -> (Vec<DividendEvent>, Vec<PricePoint>) {
        let mut events = Vec::new();
        let mut prices = Vec::new();
        for year in 2015..=2020 {
            for month in [1, 4, 7, 10] {
                events.push(event(d(year, month, 15), 0.5));
            }
            for month in 1..=12 {
                let p = if month % 2 == 0 { 40.0 } else { 60.0 };
                prices.push(PricePoint::new(d(year, month, 20), p));
            }
        }
        (events, prices)
    }

    #[test]
    fn test_yields_outside_bound_are_ignored() {
        let policy = DividendPolicy::default();
        let (events, prices) = oscillating_history();
        let clean = dividend_channel(&events, &prices, d(2015, 1, 1), &policy).unwrap();

        let mut noisy = prices.clone();
        // crash: 2.0 / 5 = 40% yield
        noisy.push(PricePoint::new(d(2018, 3, 5), 5.0));
        // spike: 2.0 / 5000 = 0.04% yield
        for day in 1..=5 {
            noisy.push(PricePoint::new(d(2018, 5, day), 5_000.0));
        }
        let ch = dividend_channel(&events, &noisy, d(2015, 1, 1), &policy).unwrap();

        assert_eq!(ch.band, clean.band);
        assert_eq!(ch.observations, clean.observations);

        noisy.sort_by_key(|p| p.date);
        let trailing = trailing_dividends(&events, d(2015, 1, 1), d(2020, 12, 20));
        let raw = yield_series(&noisy, &trailing).len();
        assert_eq!(ch.observations, raw - 6);
    }

    #[test]
    fn test_calendar_starts_at_history_start() {
        // the feed is complete from 2019 although the first payment came mid-year
        let events = [
            event(d(2019, 7, 15), 1.0),
            event(d(2020, 1, 15), 1.0),
            event(d(2020, 7, 15), 1.0),
        ];
        let prices: Vec<_> = (1..=9).map(|m| PricePoint::new(d(2020, m, 20), 50.0)).collect();

        let policy = DividendPolicy::default();
        let ch = dividend_channel(&events, &prices, d(2019, 1, 1), &policy).unwrap();
        assert_eq!(ch.observations, 9);

        // anchored at the first payment, only July onwards has a full year
        let late = dividend_channel(&events, &prices, d(2019, 7, 15), &policy);
        assert_eq!(late.unwrap().observations, 3);
    }
}
