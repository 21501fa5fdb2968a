//! Local DuckDB warehouse. Holds whatever `ingest` / `load-csv` put in and
//! serves it back through the provider traits for offline runs.

use crate::models::{
    DividendEvent, FundamentalReport, Granularity, Interval, PricePoint, SourceError,
};
use crate::sources::{DividendEventsProvider, FundamentalReportsProvider, PriceHistoryProvider};
use crate::valuation::align::downsample_monthly;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use duckdb::{Connection, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS prices (
    ticker      VARCHAR  NOT NULL,
    cadence     VARCHAR  NOT NULL,
    date        DATE     NOT NULL,
    close       DOUBLE   NOT NULL,
    loaded_at   TIMESTAMP NOT NULL,
    PRIMARY KEY (ticker, cadence, date)
);

-- long format: one row per (report, field); NULL keeps a listed-but-empty field
CREATE TABLE IF NOT EXISTS fundamentals (
    ticker          VARCHAR NOT NULL,
    granularity     VARCHAR NOT NULL,
    effective_date  DATE    NOT NULL,
    field           VARCHAR NOT NULL,
    value           DOUBLE,
    loaded_at       TIMESTAMP NOT NULL,
    PRIMARY KEY (ticker, granularity, effective_date, field)
);

CREATE TABLE IF NOT EXISTS dividends (
    ticker      VARCHAR NOT NULL,
    ex_date     DATE    NOT NULL,
    amount      DOUBLE  NOT NULL,
    loaded_at   TIMESTAMP NOT NULL,
    PRIMARY KEY (ticker, ex_date)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_prices_ticker ON prices (ticker);
CREATE INDEX IF NOT EXISTS idx_fund_ticker   ON fundamentals (ticker);
"#;

fn interval_key(interval: Interval) -> &'static str {
    match interval {
        Interval::Daily => "daily",
        Interval::Monthly => "monthly",
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Mutex<Connection>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WarehouseStats {
    pub tickers: i64,
    pub prices: i64,
    pub fundamentals: i64,
    pub dividends: i64,
    pub first_price: Option<NaiveDate>,
    pub last_price: Option<NaiveDate>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn();
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        Ok(())
    }

    // ── Prices ────────────────────────────────────────────────────────────────

    /// Idempotent: a re-loaded date overwrites its close.
    pub fn upsert_prices(
        &self,
        ticker: &str,
        interval: Interval,
        prices: &[PricePoint],
    ) -> Result<usize> {
        if prices.is_empty() {
            return Ok(0);
        }
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().naive_utc();
        for p in prices {
            tx.execute(
                r#"INSERT INTO prices (ticker, cadence, date, close, loaded_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT (ticker, cadence, date) DO UPDATE SET
                       close = excluded.close,
                       loaded_at = excluded.loaded_at"#,
                params![ticker, interval_key(interval), p.date, p.close, now],
            )
            .with_context(|| format!("insert price {} {}", ticker, p.date))?;
        }
        tx.commit()?;
        Ok(prices.len())
    }

    pub fn load_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<PricePoint>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT date, close FROM prices WHERE ticker = ? AND cadence = ? AND date >= ? ORDER BY date",
        )?;
        let rows = stmt
            .query_map(params![ticker, interval_key(interval), start], |r| {
                Ok(PricePoint::new(r.get(0)?, r.get(1)?))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Fundamentals ──────────────────────────────────────────────────────────

    pub fn upsert_reports(
        &self,
        ticker: &str,
        granularity: Granularity,
        reports: &[FundamentalReport],
    ) -> Result<usize> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().naive_utc();
        let mut rows = 0;
        for report in reports {
            for (field, value) in &report.fields {
                tx.execute(
                    r#"INSERT INTO fundamentals (ticker, granularity, effective_date, field, value, loaded_at)
                       VALUES (?, ?, ?, ?, ?, ?)
                       ON CONFLICT (ticker, granularity, effective_date, field) DO UPDATE SET
                           value = excluded.value,
                           loaded_at = excluded.loaded_at"#,
                    params![ticker, granularity.as_str(), report.effective_date, field, value, now],
                )
                .with_context(|| format!("insert {} {} {}", ticker, report.effective_date, field))?;
                rows += 1;
            }
        }
        tx.commit()?;
        Ok(rows)
    }

    pub fn load_reports(
        &self,
        ticker: &str,
        granularity: Granularity,
    ) -> Result<Vec<FundamentalReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT effective_date, field, value FROM fundamentals
             WHERE ticker = ? AND granularity = ? ORDER BY effective_date, field",
        )?;
        let rows = stmt
            .query_map(params![ticker, granularity.as_str()], |r| {
                Ok((
                    r.get::<_, NaiveDate>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<f64>>(2)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        let mut reports: BTreeMap<NaiveDate, FundamentalReport> = BTreeMap::new();
        for (date, field, value) in rows {
            reports
                .entry(date)
                .or_insert_with(|| FundamentalReport::new(date))
                .fields
                .insert(field, value);
        }
        Ok(reports.into_values().collect())
    }

    // ── Dividends ─────────────────────────────────────────────────────────────

    pub fn upsert_dividends(&self, ticker: &str, events: &[DividendEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().naive_utc();
        for e in events {
            tx.execute(
                r#"INSERT INTO dividends (ticker, ex_date, amount, loaded_at)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT (ticker, ex_date) DO UPDATE SET
                       amount = excluded.amount,
                       loaded_at = excluded.loaded_at"#,
                params![ticker, e.ex_date, e.amount, now],
            )
            .with_context(|| format!("insert dividend {} {}", ticker, e.ex_date))?;
        }
        tx.commit()?;
        Ok(events.len())
    }

    pub fn load_dividends(&self, ticker: &str) -> Result<Vec<DividendEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ex_date, amount FROM dividends WHERE ticker = ? ORDER BY ex_date",
        )?;
        let rows = stmt
            .query_map(params![ticker], |r| {
                Ok(DividendEvent {
                    ex_date: r.get(0)?,
                    amount: r.get(1)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Inventory ─────────────────────────────────────────────────────────────

    pub fn list_tickers(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ticker FROM prices UNION SELECT ticker FROM fundamentals
             UNION SELECT ticker FROM dividends ORDER BY ticker",
        )?;
        let tickers = stmt
            .query_map([], |r| r.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(tickers)
    }

    fn count(&self, table: &str) -> Result<i64> {
        let conn = self.conn();
        let mut s = conn.prepare(&format!("SELECT COUNT(*) FROM {}", table))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn stats(&self) -> Result<WarehouseStats> {
        let (first_price, last_price) = {
            let conn = self.conn();
            let mut s = conn.prepare("SELECT MIN(date), MAX(date) FROM prices")?;
            s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?
        };
        Ok(WarehouseStats {
            tickers: self.list_tickers()?.len() as i64,
            prices: self.count("prices")?,
            fundamentals: self.count("fundamentals")?,
            dividends: self.count("dividends")?,
            first_price,
            last_price,
        })
    }
}

// ── Provider impls ────────────────────────────────────────────────────────────

fn storage_err(e: anyhow::Error) -> SourceError {
    SourceError::Storage(format!("{:#}", e))
}

#[async_trait]
impl PriceHistoryProvider for Repository {
    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<PricePoint>, SourceError> {
        let prices = self.load_prices(ticker, start, interval).map_err(storage_err)?;
        if prices.is_empty() && interval == Interval::Monthly {
            // CSV imports only carry daily closes
            let daily = self.load_prices(ticker, start, Interval::Daily).map_err(storage_err)?;
            debug!("{}: monthly closes derived from {} daily rows", ticker, daily.len());
            return Ok(downsample_monthly(&daily));
        }
        Ok(prices)
    }
}

#[async_trait]
impl FundamentalReportsProvider for Repository {
    async fn reports(
        &self,
        ticker: &str,
        granularity: Granularity,
    ) -> Result<Vec<FundamentalReport>, SourceError> {
        self.load_reports(ticker, granularity).map_err(storage_err)
    }
}

#[async_trait]
impl DividendEventsProvider for Repository {
    async fn dividend_events(&self, ticker: &str) -> Result<Vec<DividendEvent>, SourceError> {
        self.load_dividends(ticker).map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let repo = repo();
        repo.run_migrations().unwrap();
        assert_eq!(repo.stats().unwrap(), WarehouseStats::default());
    }

    #[test]
    fn test_price_upsert_overwrites_and_filters_by_start() {
        let repo = repo();
        repo.upsert_prices(
            "KO",
            Interval::Daily,
            &[PricePoint::new(d(2024, 1, 2), 59.0), PricePoint::new(d(2024, 1, 3), 60.0)],
        )
        .unwrap();
        repo.upsert_prices("KO", Interval::Daily, &[PricePoint::new(d(2024, 1, 3), 61.0)])
            .unwrap();

        let all = repo.load_prices("KO", d(2000, 1, 1), Interval::Daily).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].close, 61.0);
        let late = repo.load_prices("KO", d(2024, 1, 3), Interval::Daily).unwrap();
        assert_eq!(late, vec![PricePoint::new(d(2024, 1, 3), 61.0)]);
    }

    #[test]
    fn test_reports_keep_null_fields() {
        let repo = repo();
        let mut report = FundamentalReport::new(d(2023, 12, 31)).with("DilutedEPS", 2.5);
        report.fields.insert("TotalDebt".into(), None);
        repo.upsert_reports("KO", Granularity::Annual, &[report.clone()]).unwrap();

        assert_eq!(repo.load_reports("KO", Granularity::Annual).unwrap(), vec![report]);
        assert!(repo.load_reports("KO", Granularity::Quarterly).unwrap().is_empty());
    }

    #[test]
    fn test_monthly_falls_back_to_daily() {
        let repo = repo();
        repo.upsert_prices(
            "KO",
            Interval::Daily,
            &[
                PricePoint::new(d(2024, 1, 30), 58.0),
                PricePoint::new(d(2024, 1, 31), 59.0),
                PricePoint::new(d(2024, 2, 1), 60.0),
            ],
        )
        .unwrap();

        let monthly = repo.price_history("KO", d(2024, 1, 1), Interval::Monthly);
        let monthly = tokio_test::block_on(monthly).unwrap();
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].close, 59.0);
    }

    #[test]
    fn test_dividends_and_stats() {
        let repo = repo();
        let events = [
            DividendEvent {
                ex_date: d(2023, 6, 14),
                amount: 0.46,
            },
            DividendEvent {
                ex_date: d(2023, 3, 15),
                amount: 0.46,
            },
        ];
        repo.upsert_dividends("KO", &events).unwrap();
        repo.upsert_prices("PEP", Interval::Monthly, &[PricePoint::new(d(2024, 1, 1), 170.0)])
            .unwrap();

        let loaded = tokio_test::block_on(repo.dividend_events("KO")).unwrap();
        assert_eq!(loaded[0].ex_date, d(2023, 3, 15));

        let stats = repo.stats().unwrap();
        assert_eq!(stats.tickers, 2);
        assert_eq!(stats.dividends, 2);
        assert_eq!(stats.first_price, Some(d(2024, 1, 1)));
        assert_eq!(repo.list_tickers().unwrap(), vec!["KO".to_string(), "PEP".to_string()]);
    }
}
