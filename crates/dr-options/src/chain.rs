//! Delta-targeted strike selection over a listed option chain.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dr_types::{InputError, SelectionError};

use crate::pricing::{call_delta, strike_to_f64};

/// Distances are compared at this resolution so float noise cannot flip a tie.
const DISTANCE_QUANTUM: f64 = 1e9;

/// One listed strike on a trade date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateStrike {
    pub strike: Decimal,
    /// False when the series did not trade on the date.
    pub available: bool,
    /// Per-strike volatility; the run volatility is used when absent.
    pub implied_volatility: Option<f64>,
}

impl CandidateStrike {
    pub fn new(strike: Decimal) -> Self {
        Self {
            strike,
            available: true,
            implied_volatility: None,
        }
    }

    pub fn with_implied_volatility(mut self, volatility: f64) -> Self {
        self.implied_volatility = Some(volatility);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
}

/// Per-candidate evaluation kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrace {
    pub strike: Decimal,
    pub delta: f64,
    pub distance: f64,
    pub volatility: f64,
}

impl CandidateTrace {
    pub fn new(strike: Decimal, delta: f64, target: f64, volatility: f64) -> Self {
        Self {
            strike,
            delta,
            distance: (delta - target).abs(),
            volatility,
        }
    }

    fn sort_key(&self) -> (i64, Decimal) {
        ((self.distance * DISTANCE_QUANTUM).round() as i64, self.strike)
    }
}

/// How the chosen strike relates to the tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionFit {
    /// No tolerance was configured.
    Unbounded,
    Within,
    OutOfTolerance,
}

/// Outcome of a strike selection, with the full candidate trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeSelection {
    pub strike: Decimal,
    pub delta: f64,
    pub distance: f64,
    pub volatility: f64,
    pub target: f64,
    pub tolerance: Option<f64>,
    pub fit: SelectionFit,
    pub trace: Vec<CandidateTrace>,
}

impl StrikeSelection {
    pub fn is_within_tolerance(&self) -> bool {
        self.fit != SelectionFit::OutOfTolerance
    }

    /// The tolerance breach as an error value, if there is one.
    pub fn breach(&self) -> Option<SelectionError> {
        match (self.fit, self.tolerance) {
            (SelectionFit::OutOfTolerance, Some(tolerance)) => Some(SelectionError::OutOfTolerance {
                strike: self.strike,
                delta: self.delta,
                distance: self.distance,
                target: self.target,
                tolerance,
            }),
            _ => None,
        }
    }
}

/// Pick the trace closest to `target`; equidistant strikes go to the lower one.
///
/// Returns `None` for an empty trace.
pub fn select_by_delta(
    trace: Vec<CandidateTrace>,
    target: f64,
    tolerance: Option<f64>,
) -> Option<StrikeSelection> {
    let best = *trace
        .iter()
        .min_by(|a, b| a.sort_key().cmp(&b.sort_key()))?;

    let fit = match tolerance {
        None => SelectionFit::Unbounded,
        Some(tol) if best.distance <= tol => SelectionFit::Within,
        Some(_) => SelectionFit::OutOfTolerance,
    };

    Some(StrikeSelection {
        strike: best.strike,
        delta: best.delta,
        distance: best.distance,
        volatility: best.volatility,
        target,
        tolerance,
        fit,
        trace,
    })
}

/// Price every available candidate and select the strike whose call delta is
/// closest to `target_delta`.
///
/// `Ok(None)` means there was nothing to choose from. Invalid pricing inputs
/// fail the whole selection.
pub fn select_strike(
    underlying_price: f64,
    candidates: &[CandidateStrike],
    years_to_expiry: f64,
    volatility: f64,
    risk_free_rate: f64,
    target_delta: f64,
    tolerance: Option<f64>,
) -> Result<Option<StrikeSelection>, InputError> {
    let mut trace = Vec::with_capacity(candidates.len());

    for candidate in candidates.iter().filter(|c| c.available) {
        let strike = strike_to_f64(candidate.strike)?;
        let sigma = candidate.implied_volatility.unwrap_or(volatility);
        let delta = call_delta(underlying_price, strike, years_to_expiry, sigma, risk_free_rate)?;
        let entry = CandidateTrace::new(candidate.strike, delta, target_delta, sigma);
        debug!(
            strike = %entry.strike,
            delta = entry.delta,
            distance = entry.distance,
            volatility = sigma,
            "Evaluated candidate strike"
        );
        trace.push(entry);
    }

    let selection = select_by_delta(trace, target_delta, tolerance);
    if let Some(sel) = &selection {
        debug!(
            strike = %sel.strike,
            delta = sel.delta,
            distance = sel.distance,
            fit = ?sel.fit,
            candidates = sel.trace.len(),
            "Selected strike"
        );
    }
    Ok(selection)
}
