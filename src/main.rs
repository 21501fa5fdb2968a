mod cache;
mod config;
mod loader;
mod models;
mod pipeline;
mod resolver;
mod sources;
mod storage;
mod utils;
mod valuation;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::models::{HistoricalRatios, RatioKind};
use crate::pipeline::ValuationService;
use crate::pipeline::ingest::ingest;
use crate::sources::Providers;
use crate::sources::ratio_table::ScrapedRatioTable;
use crate::sources::yahoo::YahooClient;
use crate::storage::Repository;
use crate::utils::{fmt_number, fmt_pct, years_before};
use crate::valuation::fair_value::DEFAULT_HORIZON_YEARS;

#[derive(Parser)]
#[command(
    name = "multiples",
    about = "Historical valuation multiples and dividend-yield channels",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Historical P/E, P/S, P/B and EV/EBITDA with provenance
    Ratios {
        ticker: String,

        /// Lookback window in years
        #[arg(short, long, default_value_t = 10, allow_negative_numbers = true)]
        years: i64,

        /// Read from the local warehouse instead of the network
        #[arg(long)]
        offline: bool,
    },

    /// Dividend-yield band, reference prices and BUY / HOLD / SELL
    Dividends {
        ticker: String,

        #[arg(long)]
        offline: bool,
    },

    /// Fair value from historical P/E and trailing EPS
    FairValue {
        ticker: String,

        #[arg(short, long, default_value_t = 10, allow_negative_numbers = true)]
        years: i64,

        /// Expected annual EPS growth, in percent
        #[arg(short, long, default_value_t = 12.0, allow_negative_numbers = true)]
        growth: f64,

        #[arg(long)]
        offline: bool,
    },

    /// Fetch prices, fundamentals and dividends into the local warehouse
    Ingest {
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Years of price history to fetch
        #[arg(short, long, default_value_t = 15)]
        years: u32,
    },

    /// Bulk-load CSV files (prices, dividends, fundamentals) from a directory
    LoadCsv {
        #[arg(short, long, default_value = "data")]
        dir: PathBuf,
    },

    /// Show warehouse statistics
    Stats,

    /// List tickers held in the warehouse
    Symbols,

    /// Apply schema migrations without loading data
    Migrate,
}

fn open_repository(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

fn online_providers(config: &AppConfig) -> Result<Providers> {
    let yahoo =
        Arc::new(YahooClient::new(&config.sources).context("Failed to build Yahoo client")?);
    let table = ScrapedRatioTable::new(&config.sources)
        .context("Failed to build ratio table scraper")?;
    Ok(Providers::from_single(yahoo).with_remote(Arc::new(table)))
}

fn build_providers(config: &AppConfig, offline: bool) -> Result<Providers> {
    if offline {
        let repo = open_repository(config)?;
        Ok(Providers::from_single(Arc::new(repo)))
    } else {
        online_providers(config)
    }
}

fn print_ratios(ratios: &HistoricalRatios) {
    println!("─────────────────────────────────────────────────────────");
    println!("  {} — historical multiples ({}y)", ratios.ticker, ratios.lookback_years);
    println!("─────────────────────────────────────────────────────────");
    for kind in RatioKind::ALL {
        if let Some(r) = ratios.resolved.get(&kind) {
            println!(
                "  {:<10} {:>8.2}   p5 {:>7.2}  p95 {:>7.2}  n={:<4} [{}]",
                kind,
                r.summary.central,
                r.summary.p5,
                r.summary.p95,
                r.summary.observations,
                r.provenance
            );
        } else if let Some(reason) = ratios.unavailable.get(&kind) {
            println!("  {:<10} {:>8}   {}", kind, "—", reason);
        }
    }
    println!("─────────────────────────────────────────────────────────");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "multiples=info,warn",
        1 => "multiples=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Ratios { ticker, years, offline } => {
            let _t = utils::Timer::start(format!("{} ratios", ticker));
            let service = ValuationService::new(&config, build_providers(&config, offline)?);
            let ratios = service.compute_historical_ratios(&ticker, years).await?;
            print_ratios(&ratios);
        }

        Command::Dividends { ticker, offline } => {
            let _t = utils::Timer::start(format!("{} dividend channel", ticker));
            let service = ValuationService::new(&config, build_providers(&config, offline)?);
            match service.compute_dividend_channel(&ticker).await {
                Ok(ch) => {
                    println!("─────────────────────────────────");
                    println!("  {} — dividend-yield channel", ticker.to_uppercase());
                    println!("─────────────────────────────────");
                    println!("  Yield low    : {}", fmt_pct(ch.band.low));
                    println!("  Yield median : {}", fmt_pct(ch.band.median));
                    println!("  Yield high   : {}", fmt_pct(ch.band.high));
                    println!(
                        "  Current      : {} (TTM {:.2} @ {:.2})",
                        fmt_pct(ch.current_yield),
                        ch.trailing_dividend,
                        ch.current_price
                    );
                    println!("  Buy below    : {:.2}", ch.prices.buy);
                    println!("  Fair         : {:.2}", ch.prices.fair);
                    println!("  Sell above   : {:.2}", ch.prices.sell);
                    println!("  Signal       : {}", ch.classification);
                    println!("─────────────────────────────────");
                }
                Err(reason) => println!(
                    "{}: dividend channel unavailable: {}",
                    ticker.to_uppercase(),
                    reason
                ),
            }
        }

        Command::FairValue { ticker, years, growth, offline } => {
            let _t = utils::Timer::start(format!("{} fair value", ticker));
            let service = ValuationService::new(&config, build_providers(&config, offline)?);
            let ratios = service.compute_historical_ratios(&ticker, years).await?;
            print_ratios(&ratios);
            match service.fair_value(&ratios, growth, DEFAULT_HORIZON_YEARS).await {
                Ok(fv) => {
                    println!("  Historical P/E : {:.2} [{}]", fv.historical_pe, fv.pe_provenance);
                    println!("  Current P/E    : {:.2}", fv.current_pe);
                    println!("  EPS (TTM)      : {:.2}", fv.eps_ttm);
                    println!("  Price          : {:.2}", fv.current_price);
                    println!(
                        "  Fair value     : {:.2} ({:+.1}% margin)",
                        fv.fair_value, fv.margin_of_safety_pct
                    );
                    println!(
                        "  In {}y at {:.1}%  : {:.2} ({:+.2}% CAGR)",
                        fv.horizon_years, fv.growth_pct, fv.projected_price, fv.expected_cagr_pct
                    );
                }
                Err(reason) => println!("  Fair value unavailable: {}", reason),
            }
        }

        Command::Ingest { tickers, years } => {
            let _t = utils::Timer::start("Ingest");
            let repo = Arc::new(open_repository(&config)?);
            let since = years_before(chrono::Utc::now().date_naive(), years)
                .with_context(|| format!("{} years of history is out of range", years))?;
            let stats = ingest(
                online_providers(&config)?,
                repo,
                &tickers,
                since,
                config.pipeline.concurrency,
            )
            .await;
            info!(
                "Done: {} tickers | {} prices | {} report fields | {} dividends | {} errors",
                stats.tickers_processed,
                stats.prices,
                stats.report_fields,
                stats.dividends,
                stats.errors
            );
        }

        Command::LoadCsv { dir } => {
            let _t = utils::Timer::start("CSV bulk load");
            let repo = open_repository(&config)?;
            let stats = loader::load_dir(&repo, &dir)?;
            info!(
                "Done: {} files ({} skipped) | {} prices | {} report fields | {} dividends",
                stats.files, stats.skipped, stats.prices, stats.report_fields, stats.dividends
            );
        }

        Command::Stats => {
            let stats = open_repository(&config)?.stats()?;
            println!("─────────────────────────────────");
            println!("  multiples — warehouse stats");
            println!("─────────────────────────────────");
            println!("  Tickers      : {}", fmt_number(stats.tickers));
            println!("  Prices       : {}", fmt_number(stats.prices));
            println!("  Report rows  : {}", fmt_number(stats.fundamentals));
            println!("  Dividends    : {}", fmt_number(stats.dividends));
            let day = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or("—".into());
            println!("  From         : {}", day(stats.first_price));
            println!("  To           : {}", day(stats.last_price));
            println!("─────────────────────────────────");
        }

        Command::Symbols => {
            let tickers = open_repository(&config)?.list_tickers()?;
            if tickers.is_empty() {
                println!("No tickers — run `multiples ingest` or `multiples load-csv` first.");
            } else {
                println!("{} tickers:", tickers.len());
                for t in &tickers {
                    println!("  {}", t);
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
