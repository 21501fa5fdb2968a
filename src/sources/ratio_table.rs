use crate::config::SourceConfig;
use crate::models::{RatioKind, SourceError};
use crate::sources::RemoteRatioTableProvider;
use crate::sources::http_client::HttpClient;
use crate::sources::parsers::parse_ratio_table;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

/// Pre-tabulated ratios scraped from a public statistics page.
pub struct ScrapedRatioTable {
    client: HttpClient,
    url_template: String,
}

impl ScrapedRatioTable {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            url_template: config.ratio_table_url.clone(),
        })
    }

    fn url_for(&self, ticker: &str) -> String {
        self.url_template.replace("{ticker}", &ticker.to_lowercase())
    }
}

#[async_trait]
impl RemoteRatioTableProvider for ScrapedRatioTable {
    async fn ratio_table(&self, ticker: &str) -> Result<BTreeMap<RatioKind, f64>, SourceError> {
        let url = self.url_for(ticker);
        let html = self.client.get_text(&url).await?;
        let table = parse_ratio_table(&html)?;
        if table.is_empty() {
            return Err(SourceError::Parse(format!("no ratio rows on {}", url)));
        }
        debug!("{}: scraped {} ratios", ticker, table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template_lowercases_ticker() {
        let table = ScrapedRatioTable::new(&SourceConfig::default()).unwrap();
        assert_eq!(table.url_for("MSFT"), "https://stockanalysis.com/stocks/msft/statistics/");
    }
}
