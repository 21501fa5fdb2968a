//! As-of join of an irregular series onto a regular one.
//!
//! Every base timestamp is paired with the latest auxiliary entry dated at or
//! before it. The merge walks both sequences once, so a later base timestamp can
//! never see an older auxiliary entry than an earlier one.

use crate::models::PricePoint;
use chrono::{Datelike, NaiveDate};

/// One price period with whatever auxiliary value was in force on that date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedRecord<'a, T> {
    pub date: NaiveDate,
    pub price: f64,
    /// Effective date of the auxiliary entry attached, if any.
    pub source_date: Option<NaiveDate>,
    pub value: Option<&'a T>,
}

/// Index of the latest `aux` date <= each `base` date. Both slices ascending.
pub fn as_of_indices(base: &[NaiveDate], aux: &[NaiveDate]) -> Vec<Option<usize>> {
    let mut out = Vec::with_capacity(base.len());
    let mut current = None;
    let mut next = 0;

    for &date in base {
        while next < aux.len() && aux[next] <= date {
            current = Some(next);
            next += 1;
        }
        out.push(current);
    }
    out
}

/// Align `aux` (dated values) onto `prices`. Neither input needs to be sorted;
/// the output follows ascending price date.
pub fn align<'a, T>(prices: &[PricePoint], aux: &'a [(NaiveDate, T)]) -> Vec<AlignedRecord<'a, T>> {
    let mut prices = prices.to_vec();
    prices.sort_by_key(|p| p.date);

    let mut order: Vec<usize> = (0..aux.len()).collect();
    order.sort_by_key(|&i| aux[i].0);

    let base_dates: Vec<NaiveDate> = prices.iter().map(|p| p.date).collect();
    let aux_dates: Vec<NaiveDate> = order.iter().map(|&i| aux[i].0).collect();

    as_of_indices(&base_dates, &aux_dates)
        .into_iter()
        .zip(prices)
        .map(|(idx, p)| {
            let entry = idx.map(|i| &aux[order[i]]);
            AlignedRecord {
                date: p.date,
                price: p.close,
                source_date: entry.map(|(d, _)| *d),
                value: entry.map(|(_, v)| v),
            }
        })
        .collect()
}

/// Keep the last close of every calendar month, dated on its own trading day.
pub fn downsample_monthly(points: &[PricePoint]) -> Vec<PricePoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.date);

    let mut out: Vec<PricePoint> = Vec::new();
    for p in sorted {
        match out.last_mut() {
            Some(last)
                if (last.date.year(), last.date.month()) == (p.date.year(), p.date.month()) =>
            {
                *last = p;
            }
            _ => out.push(p),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_as_of_picks_latest_at_or_before() {
        let base = [d(2024, 1, 1), d(2024, 2, 1), d(2024, 3, 1), d(2024, 4, 1)];
        let aux = [d(2024, 2, 1), d(2024, 3, 15)];
        assert_eq!(as_of_indices(&base, &aux), vec![None, Some(0), Some(0), Some(1)]);
    }

    #[test]
    fn test_empty_aux_leaves_everything_undefined() {
        let prices = vec![
            PricePoint::new(d(2024, 1, 1), 10.0),
            PricePoint::new(d(2024, 2, 1), 11.0),
        ];
        let aux: Vec<(NaiveDate, f64)> = vec![];
        let aligned = align(&prices, &aux);
        assert_eq!(aligned.len(), 2);
        assert!(aligned.iter().all(|r| r.value.is_none() && r.source_date.is_none()));
    }

    #[test]
    fn test_no_look_ahead_and_monotonic_carry_forward() {
        let prices: Vec<PricePoint> =
            (1..=12).map(|m| PricePoint::new(d(2023, m, 10), 100.0)).collect();
        // deliberately unsorted
        let aux = vec![(d(2023, 9, 30), 3), (d(2023, 3, 31), 1), (d(2023, 6, 30), 2)];

        let aligned = align(&prices, &aux);
        let mut last_source = None;
        for rec in &aligned {
            if let Some(src) = rec.source_date {
                assert!(src <= rec.date, "{} attached to {}", src, rec.date);
                if let Some(prev) = last_source {
                    assert!(src >= prev);
                }
                last_source = Some(src);
            }
        }
        let values: Vec<Option<i32>> = aligned.iter().map(|r| r.value.copied()).collect();
        assert_eq!(
            values,
            vec![
                None,
                None,
                None,
                Some(1),
                Some(1),
                Some(1),
                Some(2),
                Some(2),
                Some(2),
                Some(3),
                Some(3),
                Some(3)
            ]
        );
    }

    #[test]
    fn test_same_day_report_is_visible() {
        let prices = vec![PricePoint::new(d(2024, 3, 31), 50.0)];
        let aux = vec![(d(2024, 3, 31), "q1")];
        assert_eq!(align(&prices, &aux)[0].value, Some(&"q1"));
    }

    #[test]
    fn test_downsample_monthly_keeps_last_close() {
        let daily = vec![
            PricePoint::new(d(2024, 1, 2), 10.0),
            PricePoint::new(d(2024, 1, 31), 12.0),
            PricePoint::new(d(2024, 2, 1), 13.0),
            PricePoint::new(d(2024, 2, 29), 14.0),
        ];
        let monthly = downsample_monthly(&daily);
        assert_eq!(
            monthly,
            vec![
                PricePoint::new(d(2024, 1, 31), 12.0),
                PricePoint::new(d(2024, 2, 29), 14.0)
            ]
        );
    }
}
