//! Copy provider data into the local warehouse so later runs can go offline.
//!
//! Tickers are fetched concurrently, bounded by a semaphore. Each ticker is
//! independent: one failing leaves the others untouched. Re-running is
//! idempotent since every write is an upsert.

use crate::models::{Granularity, Interval};
use crate::sources::Providers;
use crate::sources::cleaner::normalise_symbol;
use crate::storage::Repository;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub tickers_processed: usize,
    pub prices: usize,
    pub report_fields: usize,
    pub dividends: usize,
    pub errors: usize,
}

#[derive(Debug, Default)]
struct TickerRows {
    prices: usize,
    report_fields: usize,
    dividends: usize,
}

async fn ingest_one(
    providers: &Providers,
    repo: &Repository,
    ticker: &str,
    since: NaiveDate,
) -> Result<TickerRows> {
    let mut rows = TickerRows::default();

    for interval in [Interval::Daily, Interval::Monthly] {
        let prices = providers
            .prices
            .price_history(ticker, since, interval)
            .await
            .with_context(|| format!("{} prices", interval.as_yahoo()))?;
        rows.prices += repo.upsert_prices(ticker, interval, &prices)?;
    }

    for granularity in [Granularity::Quarterly, Granularity::Annual] {
        let reports = providers
            .fundamentals
            .reports(ticker, granularity)
            .await
            .with_context(|| format!("{} fundamentals", granularity.as_str()))?;
        rows.report_fields += repo.upsert_reports(ticker, granularity, &reports)?;
    }

    let events = providers
        .dividends
        .dividend_events(ticker)
        .await
        .context("dividend events")?;
    rows.dividends += repo.upsert_dividends(ticker, &events)?;

    Ok(rows)
}

pub async fn ingest(
    providers: Providers,
    repo: Arc<Repository>,
    tickers: &[String],
    since: NaiveDate,
    concurrency: usize,
) -> IngestStats {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::new();

    for ticker in tickers.iter().map(|t| normalise_symbol(t)).filter(|t| !t.is_empty()) {
        let providers = providers.clone();
        let repo = Arc::clone(&repo);
        let sem = Arc::clone(&sem);
        let task_ticker = ticker.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire().await?;
            let rows = ingest_one(&providers, &repo, &task_ticker, since).await?;
            info!(
                "{}: {} prices | {} report fields | {} dividends",
                task_ticker, rows.prices, rows.report_fields, rows.dividends
            );
            Ok::<TickerRows, anyhow::Error>(rows)
        });
        handles.push((ticker, handle));
    }

    let mut stats = IngestStats::default();
    for (ticker, handle) in handles {
        stats.tickers_processed += 1;
        match handle.await {
            Ok(Ok(rows)) => {
                stats.prices += rows.prices;
                stats.report_fields += rows.report_fields;
                stats.dividends += rows.dividends;
            }
            Ok(Err(e)) => {
                warn!("{}: {:#}", ticker, e);
                stats.errors += 1;
            }
            Err(e) => {
                error!("Task panic for {}: {}", ticker, e);
                stats.errors += 1;
            }
        }
    }
    stats
}
