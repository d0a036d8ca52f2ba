use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::market::{ContractMonth, OptionSymbol};

/// One scheduled roll: on `roll_date` open the option expiring in `target_month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollEvent {
    /// Position of this event in the schedule (0-based).
    pub ordinal: usize,
    pub roll_date: NaiveDate,
    pub current_month: ContractMonth,
    pub target_month: ContractMonth,
    pub months_ahead: u32,
}

impl RollEvent {
    /// Futures contract targeted by this roll, e.g. `OHH2`.
    pub fn target_contract(&self, root: &str) -> String {
        self.target_month.futures_symbol(root)
    }
}

impl fmt::Display for RollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "roll #{} {} (M={} -> M+{}={})",
            self.ordinal, self.roll_date, self.current_month, self.months_ahead, self.target_month
        )
    }
}

/// Half-open date interval `[start, end)` during which an instrument is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ActiveWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &ActiveWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Lifecycle of a selected instrument relative to a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentState {
    /// Roll decided, window not yet started.
    Pending,
    /// Date lies inside the active window.
    Active,
    /// Window closed by the next roll or by expiry. Terminal.
    Expired,
}

/// The option chosen for one roll event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedInstrument {
    pub symbol: OptionSymbol,
    /// Futures contract the option is written on, e.g. `OHG2`.
    pub underlying_contract: String,
    pub strike: Decimal,
    /// Model delta at selection time.
    pub delta: f64,
    /// True unless the selection breached the configured delta tolerance.
    pub within_tolerance: bool,
    pub roll_date: NaiveDate,
    /// Last trading day of the option.
    pub expiry_date: NaiveDate,
    pub underlying_price: Decimal,
    pub volatility: f64,
    pub years_to_expiry: f64,
    pub window: ActiveWindow,
}

impl SelectedInstrument {
    pub fn ticker(&self) -> String {
        self.symbol.to_string()
    }

    pub fn expiration(&self) -> ContractMonth {
        self.symbol.expiration
    }

    /// Month code plus year digit, e.g. `G2`.
    pub fn expiration_code(&self) -> String {
        format!(
            "{}{}",
            self.symbol.expiration.code(),
            self.symbol.expiration.year_digit()
        )
    }

    pub fn state_on(&self, date: NaiveDate) -> InstrumentState {
        if date < self.window.start {
            InstrumentState::Pending
        } else if self.window.contains(date) {
            InstrumentState::Active
        } else {
            InstrumentState::Expired
        }
    }
}

/// One output row: prices per instrument symbol. Absent keys mean no price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub date: NaiveDate,
    pub prices: BTreeMap<String, Decimal>,
}

impl OutputRow {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            prices: BTreeMap::new(),
        }
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn is_blank(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn instrument() -> SelectedInstrument {
        let expiration = ContractMonth::new(2022, 2).unwrap();
        SelectedInstrument {
            symbol: OptionSymbol::call("OH", expiration, dec!(2.45)).unwrap(),
            underlying_contract: "OHG2".to_string(),
            strike: dec!(2.45),
            delta: 0.151,
            within_tolerance: true,
            roll_date: date(2021, 12, 1),
            expiry_date: date(2022, 1, 31),
            underlying_price: dec!(2.10),
            volatility: 0.3,
            years_to_expiry: 0.17,
            window: ActiveWindow::new(date(2021, 12, 1), date(2022, 1, 3)),
        }
    }

    #[test]
    fn test_window_is_half_open() {
        let w = ActiveWindow::new(date(2022, 1, 3), date(2022, 2, 1));
        assert!(w.contains(date(2022, 1, 3)));
        assert!(w.contains(date(2022, 1, 31)));
        assert!(!w.contains(date(2022, 2, 1)));
        assert!(!w.is_empty());
        assert!(ActiveWindow::new(date(2022, 2, 1), date(2022, 2, 1)).is_empty());
    }

    #[test]
    fn test_window_overlap() {
        let a = ActiveWindow::new(date(2022, 1, 3), date(2022, 2, 1));
        let b = ActiveWindow::new(date(2022, 2, 1), date(2022, 3, 1));
        let c = ActiveWindow::new(date(2022, 1, 20), date(2022, 3, 1));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_instrument_states() {
        let inst = instrument();
        assert_eq!(inst.state_on(date(2021, 11, 30)), InstrumentState::Pending);
        assert_eq!(inst.state_on(date(2021, 12, 1)), InstrumentState::Active);
        assert_eq!(inst.state_on(date(2022, 1, 3)), InstrumentState::Expired);
    }

    #[test]
    fn test_instrument_labels() {
        let inst = instrument();
        assert_eq!(inst.ticker(), "OHG2 C00245");
        assert_eq!(inst.expiration_code(), "G2");
    }

    #[test]
    fn test_output_row_absence() {
        let mut row = OutputRow::new(date(2022, 1, 3));
        assert!(row.is_blank());
        row.prices.insert("OHG2 C00245".to_string(), dec!(0.041));
        assert_eq!(row.price("OHG2 C00245"), Some(dec!(0.041)));
        assert_eq!(row.price("OHH2 C00260"), None);
    }
}
