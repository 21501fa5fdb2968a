//! Valuation service: the two public computations, memoized, over whatever
//! providers it was built with.
//!
//! ## Ratios
//! `compute_historical_ratios(ticker, years)` asks the remote table first,
//! then the calculated pipeline (quarterly, then annual fundamentals), then
//! the static defaults. Every kind ends up resolved or carrying the reason it
//! is not.
//!
//! ## Dividend channel
//! `compute_dividend_channel(ticker)` turns daily closes and dividend events
//! over the configured lookback into a yield band and a BUY / HOLD / SELL call.

pub mod ingest;

use crate::cache::MemoCache;
use crate::config::{AppConfig, DividendPolicy};
use crate::models::{
    DividendChannel, FairValueEstimate, Granularity, HistoricalRatios, Interval, RatioKind,
    Unavailable, ValuationError,
};
use crate::resolver::{
    CalculatedStrategy, RatioRequest, RemoteTableStrategy, SourceResolver, StaticDefaultStrategy,
};
use crate::sources::Providers;
use crate::sources::cleaner::normalise_symbol;
use crate::utils::years_before;
use crate::valuation::{dividend, fair_value, ratios};
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// How far back to look for the latest close when pricing a fair value.
const LATEST_PRICE_WINDOW_DAYS: u64 = 30;

pub const MAX_LOOKBACK_YEARS: u32 = 100;

/// Keyed by (ticker, lookback, as-of day).
pub type RatioCache = MemoCache<(String, u32, NaiveDate), HistoricalRatios>;
/// Keyed by (ticker, as-of day).
pub type ChannelCache = MemoCache<(String, NaiveDate), Result<DividendChannel, Unavailable>>;

pub struct ValuationService {
    providers: Providers,
    resolver: SourceResolver,
    dividend_policy: DividendPolicy,
    ratio_cache: Arc<RatioCache>,
    channel_cache: Arc<ChannelCache>,
    as_of: Option<NaiveDate>,
}

impl ValuationService {
    pub fn new(config: &AppConfig, providers: Providers) -> Self {
        let policy = config.ratios.clone();
        let resolver = SourceResolver::new(vec![
            Arc::new(RemoteTableStrategy::new(providers.remote.clone(), policy.clone())),
            Arc::new(CalculatedStrategy::new(
                providers.clone(),
                policy.clone(),
                config.sources.report_lag_days,
            )),
            Arc::new(StaticDefaultStrategy::new(policy)),
        ]);
        let ttl = config.cache.ttl();

        Self {
            providers,
            resolver,
            dividend_policy: config.dividends.clone(),
            ratio_cache: Arc::new(MemoCache::new(ttl)),
            channel_cache: Arc::new(MemoCache::new(ttl)),
            as_of: None,
        }
    }

    /// Share memo tables with another service instance.
    pub fn with_caches(mut self, ratios: Arc<RatioCache>, channels: Arc<ChannelCache>) -> Self {
        self.ratio_cache = ratios;
        self.channel_cache = channels;
        self
    }

    /// Pin "today"; prices after this date are ignored.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub async fn compute_historical_ratios(
        &self,
        ticker: &str,
        lookback_years: i64,
    ) -> Result<HistoricalRatios, ValuationError> {
        let today = self.today();
        let invalid = ValuationError::InvalidLookback(lookback_years);
        let years = u32::try_from(lookback_years)
            .ok()
            .filter(|y| (1..=MAX_LOOKBACK_YEARS).contains(y))
            .ok_or_else(|| invalid.clone())?;
        let window_start = years_before(today, years).ok_or(invalid)?;
        let ticker = normalise_symbol(ticker);
        if ticker.is_empty() {
            return Err(ValuationError::EmptyTicker);
        }

        let key = (ticker.clone(), years, today);
        if let Some(hit) = self.ratio_cache.get(&key) {
            info!("{}: ratios ({}y) from cache", ticker, years);
            return Ok(hit);
        }

        let request = RatioRequest {
            ticker: ticker.clone(),
            lookback_years: years,
            window_start,
        };
        let (resolved, unavailable) = self.resolver.resolve(&request, &RatioKind::ALL).await;
        info!(
            "{}: {} ratios resolved, {} unavailable over {}y",
            ticker,
            resolved.len(),
            unavailable.len(),
            years
        );

        let result = HistoricalRatios {
            ticker,
            lookback_years: years,
            resolved,
            unavailable,
        };
        self.ratio_cache.insert(key, result.clone());
        Ok(result)
    }

    pub async fn compute_dividend_channel(
        &self,
        ticker: &str,
    ) -> Result<DividendChannel, Unavailable> {
        let ticker = normalise_symbol(ticker);
        if ticker.is_empty() {
            return Err(Unavailable::missing("empty ticker"));
        }
        let today = self.today();
        let key = (ticker.clone(), today);
        if let Some(hit) = self.channel_cache.get(&key) {
            info!("{}: dividend channel from cache", ticker);
            return hit;
        }

        let outcome = self.dividend_channel_uncached(&ticker, today).await;
        match &outcome {
            Ok(ch) => info!(
                "{}: yield {:.4} in band [{:.4}, {:.4}] → {}",
                ticker, ch.current_yield, ch.band.low, ch.band.high, ch.classification
            ),
            Err(reason) => info!("{}: no dividend channel: {}", ticker, reason),
        }
        self.channel_cache.insert(key, outcome.clone());
        outcome
    }

    async fn dividend_channel_uncached(
        &self,
        ticker: &str,
        today: NaiveDate,
    ) -> Result<DividendChannel, Unavailable> {
        let lookback = self.dividend_policy.lookback_years.clamp(1, MAX_LOOKBACK_YEARS);
        let start = years_before(today, lookback).ok_or_else(|| {
            Unavailable::missing(format!("{lookback}y before {today} is out of range"))
        })?;

        let events = self.providers.dividends.dividend_events(ticker).await.map_err(|e| {
            warn!("{}: dividend events failed: {}", ticker, e);
            Unavailable::source("dividends", e)
        })?;
        let prices = self
            .providers
            .prices
            .price_history(ticker, start, Interval::Daily)
            .await
            .map_err(|e| {
                warn!("{}: price history failed: {}", ticker, e);
                Unavailable::source("prices", e)
            })?;

        // events from the year before the window seed its first trailing sums
        let seed_start = start.checked_sub_days(Days::new(365)).unwrap_or(start);
        let events: Vec<_> = events
            .into_iter()
            .filter(|e| e.ex_date >= seed_start && e.ex_date <= today)
            .collect();
        let prices: Vec<_> = prices.into_iter().filter(|p| p.date <= today).collect();

        dividend::dividend_channel(&events, &prices, seed_start, &self.dividend_policy)
    }

    /// Price implied by the resolved historical P/E applied to current
    /// trailing EPS, plus a `horizon_years` projection at `growth_pct`.
    pub async fn fair_value(
        &self,
        historical: &HistoricalRatios,
        growth_pct: f64,
        horizon_years: u32,
    ) -> Result<FairValueEstimate, Unavailable> {
        let pe = historical.resolved.get(&RatioKind::Pe).ok_or_else(|| {
            historical
                .unavailable
                .get(&RatioKind::Pe)
                .cloned()
                .unwrap_or_else(|| Unavailable::missing("no historical P/E"))
        })?;
        let ticker = historical.ticker.as_str();

        let mut eps_ttm = None;
        for granularity in [Granularity::Quarterly, Granularity::Annual] {
            match self.providers.fundamentals.reports(ticker, granularity).await {
                Ok(reports) => {
                    eps_ttm = ratios::latest_eps_ttm(&reports, granularity);
                    if eps_ttm.is_some() {
                        break;
                    }
                }
                Err(e) => warn!("{}: {} fundamentals failed: {}", ticker, granularity.as_str(), e),
            }
        }
        let eps_ttm = eps_ttm.ok_or_else(|| Unavailable::missing("no trailing EPS"))?;

        let today = self.today();
        let since = today
            .checked_sub_days(Days::new(LATEST_PRICE_WINDOW_DAYS))
            .unwrap_or(today);
        let prices = self
            .providers
            .prices
            .price_history(ticker, since, Interval::Daily)
            .await
            .map_err(|e| Unavailable::source("prices", e))?;
        let current_price = prices
            .iter()
            .filter(|p| p.date <= today)
            .max_by_key(|p| p.date)
            .map(|p| p.close)
            .ok_or_else(|| Unavailable::missing(format!("no close since {}", since)))?;

        fair_value::estimate(
            pe.summary.central,
            pe.provenance,
            eps_ttm,
            current_price,
            growth_pct,
            horizon_years,
        )
    }
}
