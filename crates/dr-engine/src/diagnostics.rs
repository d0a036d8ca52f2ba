use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Why a roll event produced no instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapReason {
    /// The chain for the target expiration was empty on the roll date.
    NoCandidates,
    /// No underlying price on the roll date, so deltas could not be computed.
    MissingUnderlyingQuote,
    /// The best strike missed the tolerance and the run rejects such matches.
    OutOfToleranceRejected,
    /// A data provider failed with something other than "not available".
    ProviderFailure { message: String },
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapReason::NoCandidates => write!(f, "no candidate strikes"),
            GapReason::MissingUnderlyingQuote => write!(f, "missing underlying quote"),
            GapReason::OutOfToleranceRejected => write!(f, "best strike outside delta tolerance"),
            GapReason::ProviderFailure { message } => write!(f, "provider failure: {message}"),
        }
    }
}

/// A roll month that contributes no column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollGap {
    pub roll_date: NaiveDate,
    /// Futures contract the roll targeted, e.g. `OHH2`.
    pub target_contract: String,
    pub reason: GapReason,
}

/// Output dates after an instrument's window closed that no window covers,
/// typically because the option expired before the next roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGap {
    /// Instrument whose window closed early.
    pub symbol: String,
    pub window_end: NaiveDate,
    /// Roll that follows the instrument, if any.
    pub next_roll: Option<NaiveDate>,
    pub dates: Vec<NaiveDate>,
}

/// A selection whose delta missed the tolerance band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBreach {
    pub roll_date: NaiveDate,
    pub symbol: String,
    pub strike: Decimal,
    pub delta: f64,
    pub distance: f64,
    pub target: f64,
    pub tolerance: f64,
    /// True when the instrument was kept anyway.
    pub accepted: bool,
}

/// An active cell with no market price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPrice {
    pub date: NaiveDate,
    pub symbol: String,
}

/// Recoverable conditions collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub gaps: Vec<RollGap>,
    pub window_gaps: Vec<WindowGap>,
    /// Gaps on rolls whose window could not reach the output range.
    pub omitted_gaps: Vec<RollGap>,
    pub tolerance_breaches: Vec<ToleranceBreach>,
    pub missing_prices: Vec<MissingPrice>,
    /// Instruments selected but never active inside the output range.
    pub omitted_instruments: Vec<String>,
    pub active_cells: usize,
    pub populated_cells: usize,
}

impl Diagnostics {
    pub fn record_gap(&mut self, gap: RollGap) {
        warn!(
            roll_date = %gap.roll_date,
            contract = %gap.target_contract,
            reason = %gap.reason,
            "Roll month left without an instrument"
        );
        self.gaps.push(gap);
    }

    pub fn record_window_gap(&mut self, gap: WindowGap) {
        warn!(
            symbol = %gap.symbol,
            window_end = %gap.window_end,
            next_roll = ?gap.next_roll,
            dates = gap.dates.len(),
            "Output dates not covered by any window"
        );
        self.window_gaps.push(gap);
    }

    pub fn record_breach(&mut self, breach: ToleranceBreach) {
        warn!(
            roll_date = %breach.roll_date,
            symbol = %breach.symbol,
            delta = breach.delta,
            distance = breach.distance,
            tolerance = breach.tolerance,
            accepted = breach.accepted,
            "Selected strike outside delta tolerance"
        );
        self.tolerance_breaches.push(breach);
    }

    /// Share of active cells that carry a price. 1.0 when nothing was active.
    pub fn coverage(&self) -> f64 {
        if self.active_cells == 0 {
            1.0
        } else {
            self.populated_cells as f64 / self.active_cells as f64
        }
    }

    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty() || !self.window_gaps.is_empty()
    }

    /// Output dates left blank because no window covered them.
    pub fn uncovered_dates(&self) -> Vec<NaiveDate> {
        self.window_gaps.iter().flat_map(|g| g.dates.iter().copied()).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} gap(s), {} uncovered date(s), {} tolerance breach(es), {} missing price(s), {} omitted instrument(s), coverage {:.1}%",
            self.gaps.len(),
            self.uncovered_dates().len(),
            self.tolerance_breaches.len(),
            self.missing_prices.len(),
            self.omitted_instruments.len(),
            self.coverage() * 100.0
        )
    }

    pub fn log_summary(&self) {
        info!("Diagnostics: {}", self.summary());
    }
}
