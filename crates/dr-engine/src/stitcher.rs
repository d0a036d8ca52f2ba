//! Merging per-roll instruments into one gap-aware price table.

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use dr_data::HistoryProvider;
use dr_options::expiry_for;
use dr_types::{
    ActiveWindow, DataError, DateRange, InstrumentState, OutputRow, RollEvent, RollResult,
    SelectedInstrument, TradingCalendar, WindowPolicy,
};

use crate::diagnostics::{Diagnostics, MissingPrice, WindowGap};
use crate::resolver::{resolve_all, InstrumentResolver, RollOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchOptions {
    pub window_policy: WindowPolicy,
    pub parallel: bool,
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self {
            window_policy: WindowPolicy::RollToRoll,
            parallel: true,
        }
    }
}

/// Sparse date x symbol table plus everything needed to explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchOutput {
    /// Symbols with at least one active date in range, ordered by roll date.
    pub columns: Vec<String>,
    /// One row per trading date of the output range, ascending.
    pub rows: Vec<OutputRow>,
    /// Every instrument selected, including ones outside the range.
    pub instruments: Vec<SelectedInstrument>,
    pub diagnostics: Diagnostics,
}

impl StitchOutput {
    pub fn cell(&self, date: NaiveDate, symbol: &str) -> Option<Decimal> {
        self.rows
            .binary_search_by_key(&date, |row| row.date)
            .ok()
            .and_then(|i| self.rows[i].price(symbol))
    }
}

/// Window end for the instrument opened by `events[index]`.
fn window_end(events: &[RollEvent], index: usize, expiry: NaiveDate, policy: WindowPolicy) -> NaiveDate {
    match policy {
        WindowPolicy::HoldToExpiry => expiry,
        WindowPolicy::RollToRoll => events
            .get(index + 1)
            .map_or(expiry, |next| next.roll_date.min(expiry)),
    }
}

/// Resolve each roll, assign active windows and fill the price grid.
///
/// Cells are populated only where the date lies in the instrument's window
/// and the history has a price; nothing is interpolated.
pub fn stitch(
    events: &[RollEvent],
    resolver: &dyn InstrumentResolver,
    history: &dyn HistoryProvider,
    calendar: &TradingCalendar,
    output_range: DateRange,
    options: StitchOptions,
) -> RollResult<StitchOutput> {
    let mut diagnostics = Diagnostics::default();
    let outcomes = resolve_all(resolver, events, calendar, options.parallel)?;

    let dates = calendar.between(output_range.start, output_range.end);

    // Window computation needs the full ordered schedule, so it happens after
    // every event has been resolved.
    let mut instruments = Vec::new();
    let mut next_rolls = Vec::new();
    for (index, (event, outcome)) in outcomes.into_iter().enumerate() {
        let next_roll = events.get(index + 1).map(|next| next.roll_date);
        match outcome {
            RollOutcome::Resolved { instrument, breach } => {
                if let Some(breach) = breach {
                    diagnostics.record_breach(breach);
                }
                let end = window_end(events, index, instrument.contract.expiry_date, options.window_policy);
                let window = ActiveWindow::new(event.roll_date, end);
                instruments.push(instrument.into_selected(event.roll_date, window));
                next_rolls.push(next_roll);
            }
            RollOutcome::Gap { gap, breach } => {
                if let Some(breach) = breach {
                    diagnostics.record_breach(breach);
                }
                // an unknown expiry could have reached the range
                let expiry = expiry_for(event.target_month, calendar).unwrap_or(NaiveDate::MAX);
                let window = ActiveWindow::new(event.roll_date, window_end(events, index, expiry, options.window_policy));
                if dates.iter().any(|d| window.contains(*d)) {
                    diagnostics.record_gap(gap);
                } else {
                    debug!(roll_date = %gap.roll_date, contract = %gap.target_contract, "Gap outside output range");
                    diagnostics.omitted_gaps.push(gap);
                }
            }
        }
    }

    for (inst, next_roll) in instruments.iter().zip(&next_rolls) {
        let uncovered: Vec<NaiveDate> = dates
            .iter()
            .copied()
            .filter(|d| *d >= inst.window.end && next_roll.map_or(true, |next| *d < next))
            .filter(|d| !instruments.iter().any(|other| other.window.contains(*d)))
            .collect();
        if !uncovered.is_empty() {
            diagnostics.record_window_gap(WindowGap {
                symbol: inst.ticker(),
                window_end: inst.window.end,
                next_roll: *next_roll,
                dates: uncovered,
            });
        }
    }

    let (columns, omitted): (Vec<&SelectedInstrument>, Vec<&SelectedInstrument>) = instruments
        .iter()
        .partition(|inst| dates.iter().any(|d| inst.window.contains(*d)));
    diagnostics.omitted_instruments = omitted.iter().map(|inst| inst.ticker()).collect();
    for inst in &omitted {
        debug!(symbol = %inst.symbol, window_start = %inst.window.start, "Instrument never active in output range");
    }

    let histories = fetch_histories(&columns, history, output_range, options.parallel);

    let mut rows: Vec<OutputRow> = dates.iter().map(|d| OutputRow::new(*d)).collect();
    for (inst, prices) in columns.iter().zip(&histories) {
        let ticker = inst.ticker();
        let prices = match prices {
            Ok(prices) => Some(prices),
            Err(e) => {
                warn!(symbol = %ticker, error = %e, "Price history unavailable");
                None
            }
        };
        for row in rows.iter_mut() {
            if inst.state_on(row.date) != InstrumentState::Active {
                continue;
            }
            diagnostics.active_cells += 1;
            match prices.and_then(|p| p.get(&row.date)) {
                Some(price) => {
                    row.prices.insert(ticker.clone(), *price);
                    diagnostics.populated_cells += 1;
                }
                None => diagnostics.missing_prices.push(MissingPrice {
                    date: row.date,
                    symbol: ticker.clone(),
                }),
            }
        }
    }

    let columns: Vec<String> = columns.iter().map(|inst| inst.ticker()).collect();
    info!(
        rows = rows.len(),
        columns = columns.len(),
        gaps = diagnostics.gaps.len(),
        uncovered = diagnostics.window_gaps.len(),
        "Stitched rolling series"
    );

    Ok(StitchOutput {
        columns,
        rows,
        instruments,
        diagnostics,
    })
}

/// One history per column, clipped to the part of its window inside the range.
fn fetch_histories(
    columns: &[&SelectedInstrument],
    history: &dyn HistoryProvider,
    output_range: DateRange,
    parallel: bool,
) -> Vec<Result<BTreeMap<NaiveDate, Decimal>, DataError>> {
    let fetch = |inst: &&SelectedInstrument| {
        let start = inst.window.start.max(output_range.start);
        let last_active = inst.window.end.pred_opt().unwrap_or(inst.window.end);
        let end = last_active.min(output_range.end);
        let range = DateRange::new(start, end).map_err(|e| DataError::Provider {
            provider: "stitcher".to_string(),
            message: e.to_string(),
        })?;
        match history.history(&inst.symbol, range) {
            Err(DataError::NotAvailable { .. }) => Ok(BTreeMap::new()),
            other => other,
        }
    };

    if parallel {
        columns.par_iter().map(fetch).collect()
    } else {
        columns.iter().map(fetch).collect()
    }
}
