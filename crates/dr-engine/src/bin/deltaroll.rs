//! DeltaRoll runner
//!
//! Builds the rolling delta-targeted call series for a date range and writes
//! the run report as JSON.
//!
//! Usage:
//!   cargo run --bin deltaroll -- --start 2021-12-01 --end 2022-03-31 --sample
//!   cargo run --bin deltaroll -- --start 2021-12-01 --end 2022-03-31 --data market.json --output out.json

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use dr_data::{
    CacheStats, CachedMarketData, CalendarProvider, ChainProvider, HistoryProvider, InMemoryMarketData,
    MarketDataProviders, QuoteProvider, SampleMarketData, UsFederalCalendar,
};
use dr_engine::{calendar_range, RollingOptionsEngine, RunReport, RunRequest};
use dr_types::{RollConfig, VolatilitySource};

#[derive(Parser, Debug)]
#[command(name = "deltaroll")]
#[command(about = "Rolling delta-targeted call series on a futures underlying")]
struct Args {
    /// First output date (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last output date (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Target call delta (default 0.15)
    #[arg(long)]
    target_delta: Option<f64>,

    /// Expiration offset from the roll month (default 2)
    #[arg(long)]
    months_ahead: Option<u32>,

    /// Annualised volatility used for delta (default 0.30)
    #[arg(long)]
    volatility: Option<f64>,

    /// Estimate volatility from this many trading days of underlying closes
    #[arg(long, conflicts_with = "implied_volatility")]
    historical_volatility: Option<usize>,

    /// Imply volatility from the at-the-money call settlement on each roll date
    #[arg(long)]
    implied_volatility: bool,

    /// Annualised risk-free rate (default 0.05)
    #[arg(long)]
    risk_free_rate: Option<f64>,

    /// Maximum |delta - target| before a selection is flagged
    #[arg(long)]
    tolerance: Option<f64>,

    /// JSON run configuration; flags above override it
    #[arg(long, env = "DELTAROLL_CONFIG")]
    config: Option<PathBuf>,

    /// JSON market data document
    #[arg(long, conflicts_with = "sample")]
    data: Option<PathBuf>,

    /// Use the built-in synthetic market
    #[arg(long)]
    sample: bool,

    /// Use the US federal holiday calendar instead of the data source's own
    #[arg(long)]
    federal_holidays: bool,

    /// Output JSON file (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `dr_engine=debug` (defaults to RUST_LOG, then info)
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<RollConfig> {
    let mut config = match &args.config {
        Some(path) => RollConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RollConfig::default(),
    };
    if let Some(delta) = args.target_delta {
        config = config.with_target_delta(delta);
    }
    if let Some(months) = args.months_ahead {
        config = config.with_months_ahead(months);
    }
    if let Some(vol) = args.volatility {
        config = config.with_volatility(vol);
    }
    if let Some(window_days) = args.historical_volatility {
        config = config.with_volatility_source(VolatilitySource::Historical { window_days });
    } else if args.implied_volatility {
        config = config.with_volatility_source(VolatilitySource::Implied);
    }
    if let Some(rate) = args.risk_free_rate {
        config = config.with_risk_free_rate(rate);
    }
    if args.tolerance.is_some() {
        config = config.with_tolerance(args.tolerance);
    }
    Ok(config)
}

type CacheReport = Box<dyn Fn() -> CacheStats>;

/// Historical volatility re-reads overlapping windows of underlying quotes
/// on every roll; only then is a cache in front of the source worth it.
fn bundle<P>(source: P, config: &RollConfig) -> (MarketDataProviders, Option<CacheReport>)
where
    P: CalendarProvider + QuoteProvider + ChainProvider + HistoryProvider + 'static,
{
    match config.volatility_source {
        VolatilitySource::Historical { .. } => {
            let cached = Arc::new(CachedMarketData::new(source));
            let stats = Arc::clone(&cached);
            let report: CacheReport = Box::new(move || stats.get_stats());
            (MarketDataProviders::from_source(cached), Some(report))
        }
        _ => (MarketDataProviders::from_source(Arc::new(source)), None),
    }
}

fn build_providers(
    args: &Args,
    config: &RollConfig,
    request: &RunRequest,
) -> Result<(MarketDataProviders, Option<CacheReport>)> {
    let (providers, cache) = if let Some(path) = &args.data {
        let data = InMemoryMarketData::from_json_file(path)
            .with_context(|| format!("loading market data {}", path.display()))?;
        info!("Loaded {} option prices from {:?}", data.price_count(), path);
        bundle(data, config)
    } else if args.sample {
        let range = calendar_range(config, request)?;
        let sample = SampleMarketData::new(&config.underlying_root, range)?.with_volatility(config.volatility);
        bundle(sample, config)
    } else {
        bail!("no market data: pass --data <file> or --sample");
    };

    let providers = if args.federal_holidays {
        providers.with_calendar(Arc::new(UsFederalCalendar))
    } else {
        providers
    };
    Ok((providers, cache))
}

fn write_report(report: &RunReport, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.flush()?;
            info!("Saved run report to {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, report)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    info!("DeltaRoll");
    info!("Range: {} to {}", args.start, args.end);

    let config = load_config(&args)?;
    let request = RunRequest::new(args.start, args.end);
    let (providers, cache) = build_providers(&args, &config, &request)?;

    let engine = RollingOptionsEngine::new(config, providers)?;
    let report = engine.run(request)?;

    for inst in &report.instruments {
        let shown = report.columns.contains(&inst.ticker());
        info!(
            "{} rolled {} delta {:.4} window {} -> {}{}",
            inst.ticker(),
            inst.roll_date,
            inst.delta,
            inst.window.start,
            inst.window.end,
            if shown { "" } else { " (outside range)" }
        );
    }
    for gap in &report.diagnostics.gaps {
        info!("Gap {} {}: {}", gap.roll_date, gap.target_contract, gap.reason);
    }
    info!("{}", report.diagnostics.summary());
    if let Some(stats) = cache.map(|report| report()) {
        info!(
            "Market data cache: {} hits, {} misses ({:.1}% hit rate)",
            stats.hits,
            stats.misses,
            stats.hit_rate() * 100.0
        );
    }

    write_report(&report, args.output.as_ref())?;
    Ok(())
}
