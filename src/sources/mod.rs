//! Provider boundaries consumed by the valuation core, and their Yahoo /
//! scraped-HTML implementations.

pub mod cleaner;
pub mod http_client;
pub mod parsers;
pub mod ratio_table;
pub mod yahoo;

use crate::models::{
    DividendEvent, FundamentalReport, Granularity, Interval, PricePoint, RatioKind, SourceError,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Closing prices on or after `start`, ascending. Unknown tickers yield an
/// empty series rather than an error.
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<PricePoint>, SourceError>;
}

#[async_trait]
pub trait FundamentalReportsProvider: Send + Sync {
    async fn reports(
        &self,
        ticker: &str,
        granularity: Granularity,
    ) -> Result<Vec<FundamentalReport>, SourceError>;
}

#[async_trait]
pub trait DividendEventsProvider: Send + Sync {
    async fn dividend_events(&self, ticker: &str) -> Result<Vec<DividendEvent>, SourceError>;
}

/// Externally computed current ratios. Untrusted: values are range-checked
/// before use.
#[async_trait]
pub trait RemoteRatioTableProvider: Send + Sync {
    async fn ratio_table(&self, ticker: &str) -> Result<BTreeMap<RatioKind, f64>, SourceError>;
}

/// The set of providers a valuation run draws from.
#[derive(Clone)]
pub struct Providers {
    pub prices: Arc<dyn PriceHistoryProvider>,
    pub fundamentals: Arc<dyn FundamentalReportsProvider>,
    pub dividends: Arc<dyn DividendEventsProvider>,
    pub remote: Option<Arc<dyn RemoteRatioTableProvider>>,
}

impl Providers {
    /// One value serving every data concern, with no remote table.
    pub fn from_single<P>(source: Arc<P>) -> Self
    where
        P: PriceHistoryProvider + FundamentalReportsProvider + DividendEventsProvider + 'static,
    {
        Self {
            prices: source.clone(),
            fundamentals: source.clone(),
            dividends: source,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteRatioTableProvider>) -> Self {
        self.remote = Some(remote);
        self
    }
}

/// In-memory providers for tests.
#[cfg(test)]
pub mod fixture {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct FixtureSource {
        pub daily: Vec<PricePoint>,
        pub monthly: Vec<PricePoint>,
        pub quarterly: Vec<FundamentalReport>,
        pub annual: Vec<FundamentalReport>,
        pub dividends: Vec<DividendEvent>,
        /// `None` makes the remote table fail.
        pub remote: Option<BTreeMap<RatioKind, f64>>,
        pub calls: AtomicUsize,
    }

    impl FixtureSource {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PriceHistoryProvider for FixtureSource {
        async fn price_history(
            &self,
            _ticker: &str,
            start: NaiveDate,
            interval: Interval,
        ) -> Result<Vec<PricePoint>, SourceError> {
            self.hit();
            let series = match interval {
                Interval::Daily => &self.daily,
                Interval::Monthly => &self.monthly,
            };
            Ok(series.iter().filter(|p| p.date >= start).copied().collect())
        }
    }

    #[async_trait]
    impl FundamentalReportsProvider for FixtureSource {
        async fn reports(
            &self,
            _ticker: &str,
            granularity: Granularity,
        ) -> Result<Vec<FundamentalReport>, SourceError> {
            self.hit();
            Ok(match granularity {
                Granularity::Quarterly => self.quarterly.clone(),
                Granularity::Annual => self.annual.clone(),
            })
        }
    }

    #[async_trait]
    impl DividendEventsProvider for FixtureSource {
        async fn dividend_events(&self, _ticker: &str) -> Result<Vec<DividendEvent>, SourceError> {
            self.hit();
            Ok(self.dividends.clone())
        }
    }

    #[async_trait]
    impl RemoteRatioTableProvider for FixtureSource {
        async fn ratio_table(
            &self,
            _ticker: &str,
        ) -> Result<BTreeMap<RatioKind, f64>, SourceError> {
            self.hit();
            self.remote
                .clone()
                .ok_or_else(|| SourceError::Status { status: 503, url: "fixture://ratios".into() })
        }
    }

    pub fn providers(source: FixtureSource) -> Providers {
        let source = Arc::new(source);
        Providers::from_single(source.clone()).with_remote(source)
    }
}
