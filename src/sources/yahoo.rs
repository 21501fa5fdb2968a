use crate::config::SourceConfig;
use crate::models::{
    DividendEvent, FundamentalReport, Granularity, Interval, PricePoint, SourceError,
};
use crate::sources::http_client::HttpClient;
use crate::sources::parsers::{
    parse_chart_dividends, parse_chart_prices, parse_fundamentals_timeseries,
};
use crate::sources::{DividendEventsProvider, FundamentalReportsProvider, PriceHistoryProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info};
use url::Url;

/// Timeseries fields requested from the fundamentals endpoint. Each is sent
/// with the `quarterly` / `annual` prefix and comes back without it.
pub const FUNDAMENTAL_FIELDS: &[&str] = &[
    "DilutedEPS",
    "BasicEPS",
    "NetIncomeCommonStockholders",
    "DilutedAverageShares",
    "BasicAverageShares",
    "OrdinarySharesNumber",
    "TotalRevenue",
    "TotalAssets",
    "TotalLiabilitiesNetMinorityInterest",
    "StockholdersEquity",
    "TotalDebt",
    "CashAndCashEquivalents",
    "EBITDA",
    "NormalizedEBITDA",
    "EBIT",
    "ReconciledDepreciation",
];

// Far enough back to cover any lookback the CLI accepts.
const FUNDAMENTALS_PERIOD1: i64 = 493_590_046;

/// Yahoo Finance chart and fundamentals-timeseries endpoints.
pub struct YahooClient {
    client: HttpClient,
    base_url: Url,
}

impl YahooClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = HttpClient::new(config)?;
        let base_url = Url::parse(&config.yahoo_base_url)
            .with_context(|| format!("Invalid Yahoo base URL: {}", config.yahoo_base_url))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, SourceError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| SourceError::Parse(format!("bad endpoint {}: {}", path, e)))?;
        url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }

    fn chart_url(
        &self,
        ticker: &str,
        period1: i64,
        interval: &str,
        events: &str,
    ) -> Result<Url, SourceError> {
        self.endpoint(
            &format!("/v8/finance/chart/{}", ticker),
            &[
                ("period1", period1.to_string()),
                ("period2", Utc::now().timestamp().to_string()),
                ("interval", interval.to_string()),
                ("events", events.to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ],
        )
    }

    fn timeseries_url(&self, ticker: &str, granularity: Granularity) -> Result<Url, SourceError> {
        let types = FUNDAMENTAL_FIELDS
            .iter()
            .map(|f| format!("{}{}", granularity.as_str(), f))
            .collect::<Vec<_>>()
            .join(",");
        self.endpoint(
            &format!("/ws/fundamentals-timeseries/v1/finance/timeseries/{}", ticker),
            &[
                ("symbol", ticker.to_string()),
                ("type", types),
                ("period1", FUNDAMENTALS_PERIOD1.to_string()),
                ("period2", Utc::now().timestamp().to_string()),
            ],
        )
    }
}

fn unix_start(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()).unwrap_or(0)
}

#[async_trait]
impl PriceHistoryProvider for YahooClient {
    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<PricePoint>, SourceError> {
        let url = self.chart_url(ticker, unix_start(start), interval.as_yahoo(), "history")?;
        let body = match self.client.get_text(url.as_str()).await {
            Ok(body) => body,
            // unknown symbol
            Err(SourceError::Status { status: 404, .. }) => {
                info!("{}: no price history on Yahoo", ticker);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let prices = parse_chart_prices(&body)?;
        debug!("{}: {} {} closes since {}", ticker, prices.len(), interval.as_yahoo(), start);
        Ok(prices)
    }
}

#[async_trait]
impl FundamentalReportsProvider for YahooClient {
    async fn reports(
        &self,
        ticker: &str,
        granularity: Granularity,
    ) -> Result<Vec<FundamentalReport>, SourceError> {
        let url = self.timeseries_url(ticker, granularity)?;
        let body = self.client.get_text(url.as_str()).await?;
        let reports = parse_fundamentals_timeseries(&body, granularity)?;
        debug!("{}: {} {} reports", ticker, reports.len(), granularity.as_str());
        Ok(reports)
    }
}

#[async_trait]
impl DividendEventsProvider for YahooClient {
    async fn dividend_events(&self, ticker: &str) -> Result<Vec<DividendEvent>, SourceError> {
        let url = self.chart_url(ticker, 0, Interval::Monthly.as_yahoo(), "div")?;
        let body = match self.client.get_text(url.as_str()).await {
            Ok(body) => body,
            Err(SourceError::Status { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        parse_chart_dividends(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> YahooClient {
        YahooClient::new(&SourceConfig::default()).unwrap()
    }

    #[test]
    fn test_chart_url() {
        let url = client().chart_url("AAPL", 1_704_067_200, "1mo", "history").unwrap();
        assert_eq!(url.host_str(), Some("query2.finance.yahoo.com"));
        assert_eq!(url.path(), "/v8/finance/chart/AAPL");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("interval".into(), "1mo".into())));
        assert!(query.contains(&("period1".into(), "1704067200".into())));
    }

    #[test]
    fn test_timeseries_url_prefixes_fields() {
        let url = client().timeseries_url("KO", Granularity::Annual).unwrap();
        assert_eq!(url.path(), "/ws/fundamentals-timeseries/v1/finance/timeseries/KO");
        let types = url
            .query_pairs()
            .find(|(k, _)| k == "type")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(types.starts_with("annualDilutedEPS,annualBasicEPS"));
        assert_eq!(types.split(',').count(), FUNDAMENTAL_FIELDS.len());
    }

    #[test]
    fn test_unix_start() {
        assert_eq!(unix_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()), 1_704_067_200);
    }
}
