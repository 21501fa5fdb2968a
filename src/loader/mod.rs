//! CSV import into the local warehouse.
//!
//! File names decide what a file holds:
//! `KO.csv` (investing.com price export), `KO_dividends.csv` (date, amount),
//! `KO_quarterly.csv` / `KO_annual.csv` (date column, then one column per
//! provider field).

use crate::models::{
    DividendEvent, FundamentalReport, Granularity, Interval, PricePoint, RawCsvRow, RawDividendRow,
};
use crate::sources::cleaner::{normalise_symbol, parse_date, parse_number};
use crate::storage::Repository;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvKind {
    Prices,
    Dividends,
    Fundamentals(Granularity),
}

/// Ticker and content kind from a CSV file name.
pub fn classify_csv(path: &Path) -> Option<(String, CsvKind)> {
    let stem = path.file_stem()?.to_str()?.trim();
    let (symbol, kind) = match stem.rsplit_once('_') {
        Some((sym, suffix)) => {
            let kind = match suffix.to_lowercase().as_str() {
                "dividends" | "divs" => CsvKind::Dividends,
                "quarterly" => CsvKind::Fundamentals(Granularity::Quarterly),
                "annual" => CsvKind::Fundamentals(Granularity::Annual),
                "prices" | "historical" => CsvKind::Prices,
                _ => return None,
            };
            (sym, kind)
        }
        None => (stem, CsvKind::Prices),
    };

    let symbol = normalise_symbol(symbol);
    if symbol.is_empty() { None } else { Some((symbol, kind)) }
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

/// investing.com export: Date, Price, Open, High, Low, Vol., Change %.
/// Only the close is kept; rows without a positive close are skipped.
pub fn read_prices<R: Read>(input: R) -> Result<Vec<PricePoint>> {
    let mut by_date = BTreeMap::new();
    for (i, result) in reader(input).records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Price row {}: {}", i + 1, e);
                continue;
            }
        };
        let raw = RawCsvRow {
            date: record.get(0).map(str::to_string),
            price: record.get(1).map(str::to_string),
        };
        let date = raw.date.as_deref().and_then(parse_date);
        let close = raw.price.as_deref().and_then(parse_number).filter(|c| *c > 0.0);
        match (date, close) {
            (Some(date), Some(close)) => {
                by_date.insert(date, close);
            }
            _ => debug!("Skipping price row {}: {:?}", i + 1, raw),
        }
    }
    Ok(by_date.into_iter().map(|(d, c)| PricePoint::new(d, c)).collect())
}

pub fn read_dividends<R: Read>(input: R) -> Result<Vec<DividendEvent>> {
    let mut events = Vec::new();
    for (i, result) in reader(input).records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Dividend row {}: {}", i + 1, e);
                continue;
            }
        };
        let raw = RawDividendRow {
            date: record.get(0).map(str::to_string),
            amount: record.get(1).map(str::to_string),
        };
        let ex_date = raw.date.as_deref().and_then(parse_date);
        let amount = raw.amount.as_deref().and_then(parse_number).filter(|a| *a > 0.0);
        match (ex_date, amount) {
            (Some(ex_date), Some(amount)) => events.push(DividendEvent { ex_date, amount }),
            _ => debug!("Skipping dividend row {}: {:?}", i + 1, raw),
        }
    }
    events.sort_by_key(|e| e.ex_date);
    Ok(events)
}

/// Wide layout: the first column is the report date, every other header is a
/// field name. Blank or unparseable cells become null fields.
pub fn read_fundamentals<R: Read>(input: R) -> Result<Vec<FundamentalReport>> {
    let mut rdr = reader(input);
    let headers = rdr.headers().context("Missing header row")?.clone();

    let mut reports: BTreeMap<_, FundamentalReport> = BTreeMap::new();
    for (i, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Fundamentals row {}: {}", i + 1, e);
                continue;
            }
        };
        let Some(date) = record.get(0).and_then(parse_date) else {
            debug!("Skipping fundamentals row {}: no date", i + 1);
            continue;
        };
        let report = reports.entry(date).or_insert_with(|| FundamentalReport::new(date));
        for (field, cell) in headers.iter().zip(record.iter()).skip(1) {
            if !field.is_empty() {
                report.fields.insert(field.to_string(), parse_number(cell));
            }
        }
    }
    Ok(reports.into_values().collect())
}

pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub files: usize,
    pub skipped: usize,
    pub prices: usize,
    pub dividends: usize,
    pub report_fields: usize,
}

/// Load one classified file into the warehouse; returns rows written.
pub fn load_file(repo: &Repository, path: &Path, symbol: &str, kind: CsvKind) -> Result<usize> {
    let file = std::fs::File::open(path).with_context(|| format!("Cannot open {:?}", path))?;
    let rows = match kind {
        CsvKind::Prices => repo.upsert_prices(symbol, Interval::Daily, &read_prices(file)?)?,
        CsvKind::Dividends => repo.upsert_dividends(symbol, &read_dividends(file)?)?,
        CsvKind::Fundamentals(g) => repo.upsert_reports(symbol, g, &read_fundamentals(file)?)?,
    };
    info!("{}: {} rows from {:?}", symbol, rows, path.file_name().unwrap_or_default());
    Ok(rows)
}

pub fn load_dir(repo: &Repository, dir: &Path) -> Result<LoadStats> {
    let mut stats = LoadStats::default();
    for path in discover_csv_files(dir)? {
        let Some((symbol, kind)) = classify_csv(&path) else {
            warn!("Unrecognised CSV name {:?}, skipping", path);
            stats.skipped += 1;
            continue;
        };
        let rows = match load_file(repo, &path, &symbol, kind) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{:?}: {:#}", path, e);
                stats.skipped += 1;
                continue;
            }
        };
        stats.files += 1;
        match kind {
            CsvKind::Prices => stats.prices += rows,
            CsvKind::Dividends => stats.dividends += rows,
            CsvKind::Fundamentals(_) => stats.report_fields += rows,
        }
    }
    Ok(stats)
}
