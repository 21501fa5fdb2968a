pub mod error;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use self::error::{SourceError, Unavailable, ValuationError};

// ── Prices ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Sampling cadence requested from a price provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    Daily,
    Monthly,
}

impl Interval {
    pub fn as_yahoo(self) -> &'static str {
        match self {
            Self::Daily => "1d",
            Self::Monthly => "1mo",
        }
    }
}

// ── Fundamentals ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Quarterly,
    Annual,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }
}

/// One disclosure as returned by a provider. Field names are provider-specific;
/// a `None` value is a field the provider listed but left empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundamentalReport {
    pub effective_date: NaiveDate,
    pub fields: BTreeMap<String, Option<f64>>,
}

impl FundamentalReport {
    pub fn new(effective_date: NaiveDate) -> Self {
        Self {
            effective_date,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: f64) -> Self {
        self.fields.insert(field.to_string(), Some(value));
        self
    }

    /// Present, non-null and finite.
    pub fn value(&self, field: &str) -> Option<f64> {
        self.fields
            .get(field)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }
}

// ── Dividends ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DividendEvent {
    pub ex_date: NaiveDate,
    pub amount: f64,
}

// ── Ratios ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RatioKind {
    Pe,
    Ps,
    Pb,
    EvEbitda,
}

impl RatioKind {
    pub const ALL: [RatioKind; 4] = [Self::Pe, Self::Ps, Self::Pb, Self::EvEbitda];

    pub fn label(self) -> &'static str {
        match self {
            Self::Pe => "P/E",
            Self::Ps => "P/S",
            Self::Pb => "P/B",
            Self::EvEbitda => "EV/EBITDA",
        }
    }
}

impl fmt::Display for RatioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RatioPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Only periods with a defined, strictly positive denominator are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatioSeries {
    pub kind: RatioKind,
    pub points: Vec<RatioPoint>,
}

impl RatioSeries {
    pub fn new(kind: RatioKind) -> Self {
        Self {
            kind,
            points: Vec::new(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Open interval a ratio must fall in to be treated as a genuine value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlausibilityBound {
    pub lower: f64,
    pub upper: f64,
}

impl PlausibilityBound {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value > self.lower && value < self.upper
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPolicy {
    /// Median with a p5/p95 band.
    #[default]
    Robust,
    /// Arithmetic mean. Only for comparing against older results.
    LegacyMean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RatioSummary {
    pub central: f64,
    pub p5: f64,
    pub p95: f64,
    pub policy: SummaryPolicy,
    pub observations: usize,
}

impl RatioSummary {
    /// A single externally supplied value with no dispersion information.
    pub fn point(value: f64) -> Self {
        Self {
            central: value,
            p5: value,
            p95: value,
            policy: SummaryPolicy::Robust,
            observations: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Scraped,
    Calculated,
    Default,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scraped => "scraped",
            Self::Calculated => "calculated",
            Self::Default => "default",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResolvedRatio {
    pub kind: RatioKind,
    pub summary: RatioSummary,
    pub provenance: Provenance,
}

/// Result of `compute_historical_ratios`: every requested kind lands in exactly
/// one of the two maps.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRatios {
    pub ticker: String,
    pub lookback_years: u32,
    pub resolved: BTreeMap<RatioKind, ResolvedRatio>,
    pub unavailable: BTreeMap<RatioKind, Unavailable>,
}

// ── Dividend channel ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct YieldBand {
    pub low: f64,
    pub median: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReferencePrices {
    pub buy: f64,
    pub fair: f64,
    pub sell: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DividendChannel {
    pub band: YieldBand,
    pub current_yield: f64,
    pub trailing_dividend: f64,
    pub current_price: f64,
    pub prices: ReferencePrices,
    pub classification: Classification,
    pub observations: usize,
}

// ── Fair value ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FairValueEstimate {
    pub historical_pe: f64,
    pub pe_provenance: Provenance,
    pub eps_ttm: f64,
    pub current_price: f64,
    /// Price over trailing EPS today.
    pub current_pe: f64,
    pub fair_value: f64,
    pub margin_of_safety_pct: f64,
    pub growth_pct: f64,
    pub horizon_years: u32,
    pub projected_price: f64,
    pub expected_cagr_pct: f64,
}

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// investing.com equity CSV: Date, Price, Open, High, Low, Volume, Change%
#[derive(Debug, Clone, Default)]
pub struct RawCsvRow {
    pub date: Option<String>,
    pub price: Option<String>,
}

/// Dividend CSV: Date, Amount
#[derive(Debug, Clone, Default)]
pub struct RawDividendRow {
    pub date: Option<String>,
    pub amount: Option<String>,
}
