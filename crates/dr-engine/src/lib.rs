// DeltaRoll engine: schedule monthly rolls, pick the delta-targeted call for
// each, and stitch their prices into one continuous series.

pub mod diagnostics;
pub mod resolver;
pub mod scheduler;
pub mod stitcher;

pub use diagnostics::*;
pub use resolver::*;
pub use scheduler::*;
pub use stitcher::*;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use dr_data::{build_calendar, MarketDataProviders};
use dr_types::{
    ContractMonth, DateRange, OutputRow, RollConfig, RollEvent, RollResult, SelectedInstrument,
    VolatilitySource,
};

/// Output range of a run, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RunRequest {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub request: RunRequest,
    pub config: RollConfig,
    pub roll_events: Vec<RollEvent>,
    pub columns: Vec<String>,
    pub rows: Vec<OutputRow>,
    pub instruments: Vec<SelectedInstrument>,
    pub diagnostics: Diagnostics,
}

impl RunReport {
    pub fn cell(&self, date: NaiveDate, symbol: &str) -> Option<rust_decimal::Decimal> {
        self.rows
            .binary_search_by_key(&date, |row| row.date)
            .ok()
            .and_then(|i| self.rows[i].price(symbol))
    }

    pub fn instrument(&self, symbol: &str) -> Option<&SelectedInstrument> {
        self.instruments.iter().find(|inst| inst.ticker() == symbol)
    }
}

/// Fewest trading days a month has, used to size the volatility lookback.
const MIN_TRADING_DAYS_PER_MONTH: u32 = 19;

/// First day the roll schedule starts from: the first lookback month.
pub fn schedule_start(config: &RollConfig, request: &RunRequest) -> NaiveDate {
    ContractMonth::of(request.start)
        .sub_months(config.lookback_months)
        .first_day()
}

/// Calendar span a run over `request` needs: from the first lookback month
/// (earlier still when historical volatility needs closes before it) through
/// the expiry month of the last possible target.
pub fn calendar_range(config: &RollConfig, request: &RunRequest) -> RollResult<DateRange> {
    let output = DateRange::new(request.start, request.end)?;
    let mut first = ContractMonth::of(schedule_start(config, request));
    if let VolatilitySource::Historical { window_days } = config.volatility_source {
        let window = u32::try_from(window_days).unwrap_or(u32::MAX);
        first = first.sub_months(window.div_ceil(MIN_TRADING_DAYS_PER_MONTH));
    }
    let last_target = ContractMonth::of(output.end).add_months(config.months_ahead);
    let horizon = last_target.previous().last_day().max(output.end);
    Ok(DateRange::new(first.first_day(), horizon)?)
}

/// Runs the rolling delta-targeted strategy against a set of data providers.
#[derive(Debug, Clone)]
pub struct RollingOptionsEngine {
    config: RollConfig,
    providers: MarketDataProviders,
}

impl RollingOptionsEngine {
    /// Create an engine; the configuration is validated up front.
    pub fn new(config: RollConfig, providers: MarketDataProviders) -> RollResult<Self> {
        config.validate()?;
        info!(
            underlying = %config.underlying_root,
            option_root = %config.option_root,
            target_delta = config.target_delta,
            months_ahead = config.months_ahead,
            "Initializing DeltaRoll engine"
        );
        Ok(Self { config, providers })
    }

    pub fn config(&self) -> &RollConfig {
        &self.config
    }

    /// Calendar span needed for `request`. See [`calendar_range`].
    pub fn calendar_range(&self, request: &RunRequest) -> RollResult<DateRange> {
        calendar_range(&self.config, request)
    }

    pub fn run(&self, request: RunRequest) -> RollResult<RunReport> {
        let cfg = &self.config;
        let output_range = DateRange::new(request.start, request.end)?;
        info!(start = %request.start, end = %request.end, "Starting DeltaRoll run");

        let calendar_range = self.calendar_range(&request)?;
        let calendar = build_calendar(self.providers.calendar.as_ref(), calendar_range)?;

        let first_roll_month = schedule_start(cfg, &request);
        let events = schedule_rolls(first_roll_month, output_range.end, cfg.months_ahead, &calendar)?;
        info!(events = events.len(), first = ?events.first().map(|e| e.roll_date), "Roll schedule ready");

        let resolver = DeltaTargetResolver::new(cfg, self.providers.quotes.as_ref(), self.providers.chains.as_ref())
            .with_history(self.providers.history.as_ref());
        let options = StitchOptions {
            window_policy: cfg.window_policy,
            parallel: cfg.parallel,
        };
        let output = stitch(
            &events,
            &resolver,
            self.providers.history.as_ref(),
            &calendar,
            output_range,
            options,
        )?;

        let report = RunReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            request,
            config: cfg.clone(),
            roll_events: events,
            columns: output.columns,
            rows: output.rows,
            instruments: output.instruments,
            diagnostics: output.diagnostics,
        };

        report.diagnostics.log_summary();
        info!(
            run_id = %report.run_id,
            rows = report.rows.len(),
            columns = report.columns.len(),
            "DeltaRoll run completed"
        );
        Ok(report)
    }
}
