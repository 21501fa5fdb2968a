use crate::models::{PlausibilityBound, RatioKind, SummaryPolicy};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourceConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub ratios: RatioPolicy,
    pub dividends: DividendPolicy,
}

/// Remote provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_yahoo_base_url")]
    pub yahoo_base_url: String,

    /// `{ticker}` is substituted with the lower-cased symbol.
    #[serde(default = "default_ratio_table_url")]
    pub ratio_table_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Days added to a report's period end before it is considered public.
    #[serde(default)]
    pub report_lag_days: i64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Bulk ingest settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Tickers fetched in parallel by `ingest`.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Filtering and summarization policy for the historical ratio pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RatioPolicy {
    #[serde(default)]
    pub summary: SummaryPolicy,

    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    #[serde(default)]
    pub bounds: RatioBounds,

    #[serde(default)]
    pub defaults: RatioDefaults,
}

/// Exclusive upper caps; every ratio must also be strictly positive.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RatioBounds {
    #[serde(default = "default_pe_cap")]
    pub pe: f64,
    #[serde(default = "default_ps_cap")]
    pub ps: f64,
    #[serde(default = "default_pb_cap")]
    pub pb: f64,
    #[serde(default = "default_ev_ebitda_cap")]
    pub ev_ebitda: f64,
}

/// Static fallbacks used when neither the remote table nor the computation resolves.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RatioDefaults {
    #[serde(default = "default_pe")]
    pub pe: Option<f64>,
    #[serde(default = "default_ps")]
    pub ps: Option<f64>,
    #[serde(default = "default_pb")]
    pub pb: Option<f64>,
    #[serde(default = "default_ev_ebitda")]
    pub ev_ebitda: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DividendPolicy {
    #[serde(default = "default_dividend_lookback_years")]
    pub lookback_years: u32,

    #[serde(default = "default_min_yield")]
    pub min_yield: f64,

    #[serde(default = "default_max_yield")]
    pub max_yield: f64,

    /// BUY when current yield >= buy_threshold * high band.
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: f64,

    /// SELL when current yield <= sell_threshold * low band.
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: f64,

    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_yahoo_base_url() -> String {
    "https://query2.finance.yahoo.com".to_string()
}
fn default_ratio_table_url() -> String {
    "https://stockanalysis.com/stocks/{ticker}/statistics/".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_max_retries() -> usize {
    2
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) valuation-multiples/0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/multiples.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_concurrency() -> usize {
    4
}
fn default_min_observations() -> usize {
    3
}
fn default_pe_cap() -> f64 {
    200.0
}
fn default_ps_cap() -> f64 {
    50.0
}
fn default_pb_cap() -> f64 {
    50.0
}
fn default_ev_ebitda_cap() -> f64 {
    100.0
}
fn default_pe() -> Option<f64> {
    Some(15.0)
}
fn default_ps() -> Option<f64> {
    Some(1.5)
}
fn default_pb() -> Option<f64> {
    Some(1.5)
}
fn default_ev_ebitda() -> Option<f64> {
    Some(10.0)
}
fn default_dividend_lookback_years() -> u32 {
    10
}
fn default_min_yield() -> f64 {
    0.001
}
fn default_max_yield() -> f64 {
    0.20
}
fn default_buy_threshold() -> f64 {
    0.95
}
fn default_sell_threshold() -> f64 {
    1.10
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            yahoo_base_url: default_yahoo_base_url(),
            ratio_table_url: default_ratio_table_url(),
            timeout_secs: default_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            report_lag_days: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Default for RatioPolicy {
    fn default() -> Self {
        Self {
            summary: SummaryPolicy::Robust,
            min_observations: default_min_observations(),
            bounds: RatioBounds::default(),
            defaults: RatioDefaults::default(),
        }
    }
}

impl Default for RatioBounds {
    fn default() -> Self {
        Self {
            pe: default_pe_cap(),
            ps: default_ps_cap(),
            pb: default_pb_cap(),
            ev_ebitda: default_ev_ebitda_cap(),
        }
    }
}

impl Default for RatioDefaults {
    fn default() -> Self {
        Self {
            pe: default_pe(),
            ps: default_ps(),
            pb: default_pb(),
            ev_ebitda: default_ev_ebitda(),
        }
    }
}

impl Default for DividendPolicy {
    fn default() -> Self {
        Self {
            lookback_years: default_dividend_lookback_years(),
            min_yield: default_min_yield(),
            max_yield: default_max_yield(),
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            min_observations: default_min_observations(),
        }
    }
}

// ── Policy accessors ─────────────────────────────────────────────────────────

impl RatioPolicy {
    pub fn bound(&self, kind: RatioKind) -> PlausibilityBound {
        let cap = match kind {
            RatioKind::Pe => self.bounds.pe,
            RatioKind::Ps => self.bounds.ps,
            RatioKind::Pb => self.bounds.pb,
            RatioKind::EvEbitda => self.bounds.ev_ebitda,
        };
        PlausibilityBound::new(0.0, cap)
    }

    /// Non-positive values disable the fallback (TOML has no null).
    pub fn default_value(&self, kind: RatioKind) -> Option<f64> {
        let value = match kind {
            RatioKind::Pe => self.defaults.pe,
            RatioKind::Ps => self.defaults.ps,
            RatioKind::Pb => self.defaults.pb,
            RatioKind::EvEbitda => self.defaults.ev_ebitda,
        };
        value.filter(|v| *v > 0.0)
    }

    /// Zero would let an empty series through.
    pub fn min_observations(&self) -> usize {
        self.min_observations.max(1)
    }
}

impl DividendPolicy {
    pub fn bound(&self) -> PlausibilityBound {
        PlausibilityBound::new(self.min_yield, self.max_yield)
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations.max(1)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("MULTIPLES").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
