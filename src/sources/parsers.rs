use crate::models::{
    DividendEvent, FundamentalReport, Granularity, PricePoint, RatioKind, SourceError,
};
use crate::sources::cleaner::{date_from_unix, parse_number, ratio_kind_for_label};
use chrono::NaiveDate;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ── Yahoo chart (/v8/finance/chart) ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
    #[serde(default)]
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: BTreeMap<String, ChartDividend>,
}

#[derive(Debug, Deserialize)]
struct ChartDividend {
    amount: f64,
    date: i64,
}

fn chart_result(body: &str) -> Result<Option<ChartResult>, SourceError> {
    let resp: ChartResponse = serde_json::from_str(body)?;
    if let Some(err) = resp.chart.error.filter(|e| !e.is_null()) {
        return Err(SourceError::Parse(format!("chart error: {}", err)));
    }
    Ok(resp.chart.result.and_then(|r| r.into_iter().next()))
}

/// Close prices, ascending, one per date (the last quote wins on duplicates).
pub fn parse_chart_prices(body: &str) -> Result<Vec<PricePoint>, SourceError> {
    let Some(result) = chart_result(body)? else {
        return Ok(Vec::new());
    };
    let closes = result.indicators.quote.into_iter().next().map(|q| q.close).unwrap_or_default();

    let mut by_date = BTreeMap::new();
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let (Some(date), Some(close)) = (date_from_unix(*ts), close) else {
            continue;
        };
        if close.is_finite() && close > 0.0 {
            by_date.insert(date, close);
        }
    }
    Ok(by_date.into_iter().map(|(date, close)| PricePoint::new(date, close)).collect())
}

/// Dividend events attached to a chart response, ascending by ex-date.
pub fn parse_chart_dividends(body: &str) -> Result<Vec<DividendEvent>, SourceError> {
    let Some(result) = chart_result(body)? else {
        return Ok(Vec::new());
    };
    let mut events: Vec<DividendEvent> = result
        .events
        .map(|e| e.dividends.into_values().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .filter(|d| d.amount.is_finite() && d.amount > 0.0)
        .filter_map(|d| {
            Some(DividendEvent {
                ex_date: date_from_unix(d.date)?,
                amount: d.amount,
            })
        })
        .collect();
    events.sort_by_key(|e| e.ex_date);
    Ok(events)
}

// ── Yahoo fundamentals timeseries ────────────────────────────────────────────

/// Group a fundamentals-timeseries payload into one report per `asOfDate`.
/// Field names lose their `quarterly` / `annual` prefix; an entry without a
/// reported value becomes a null field.
pub fn parse_fundamentals_timeseries(
    body: &str,
    granularity: Granularity,
) -> Result<Vec<FundamentalReport>, SourceError> {
    let doc: Value = serde_json::from_str(body)?;
    let results = doc
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Parse("timeseries.result missing".into()))?;

    let prefix = granularity.as_str();
    let mut reports: BTreeMap<NaiveDate, FundamentalReport> = BTreeMap::new();

    for series in results {
        let Some(type_name) = series.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(field) = type_name.strip_prefix(prefix) else {
            debug!("skipping timeseries {} for {} request", type_name, prefix);
            continue;
        };
        let Some(entries) = series.get(type_name).and_then(Value::as_array) else {
            continue;
        };

        for entry in entries.iter().filter(|e| !e.is_null()) {
            let Some(date) = entry
                .get("asOfDate")
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            else {
                continue;
            };
            let value = entry.pointer("/reportedValue/raw").and_then(Value::as_f64);
            reports
                .entry(date)
                .or_insert_with(|| FundamentalReport::new(date))
                .fields
                .insert(field.to_string(), value);
        }
    }

    Ok(reports.into_values().collect())
}

// ── Statistics page ratio table ──────────────────────────────────────────────

/// Scan every table row for a (label, value) pair naming a ratio. The first
/// parseable occurrence of each kind wins.
pub fn parse_ratio_table(html: &str) -> Result<BTreeMap<RatioKind, f64>, SourceError> {
    let doc = Html::parse_document(html);
    let row_sel = Selector::parse("tr")
        .map_err(|e| SourceError::Parse(format!("row selector: {:?}", e)))?;
    let cell_sel = Selector::parse("td, th")
        .map_err(|e| SourceError::Parse(format!("cell selector: {:?}", e)))?;

    let mut table = BTreeMap::new();
    for tr in doc.select(&row_sel) {
        let cells: Vec<String> = tr
            .select(&cell_sel)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();

        if cells.len() < 2 {
            continue;
        }
        let Some(kind) = ratio_kind_for_label(&cells[0]) else {
            continue;
        };
        if table.contains_key(&kind) {
            continue;
        }
        match parse_number(&cells[1]) {
            Some(value) => {
                table.insert(kind, value);
            }
            None => warn!("unparseable {} cell {:?}", kind, cells[1]),
        }
    }
    Ok(table)
}
