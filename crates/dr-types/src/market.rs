use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::InputError;

/// Standard futures month-letter table, January first.
pub const MONTH_CODES: [char; 12] = ['F', 'G', 'H', 'J', 'K', 'M', 'N', 'Q', 'U', 'V', 'X', 'Z'];

/// Strike-to-symbol scale used by the option symbol grammar.
const STRIKE_SYMBOL_SCALE: i64 = 100;

/// Month letter for a 1-based calendar month.
pub fn month_code(month: u32) -> Result<char, InputError> {
    if (1..=12).contains(&month) {
        Ok(MONTH_CODES[(month - 1) as usize])
    } else {
        Err(InputError::InvalidMonth { month })
    }
}

/// Calendar month for a month letter.
pub fn month_from_code(code: char) -> Option<u32> {
    MONTH_CODES
        .iter()
        .position(|c| *c == code)
        .map(|i| i as u32 + 1)
}

/// Resolve a single-digit year code to the full year closest to `reference_year`
/// (searching `reference_year - 5 ..= reference_year + 4`).
pub fn resolve_year_digit(digit: u32, reference_year: i32) -> i32 {
    let digit = (digit % 10) as i32;
    let base = reference_year - 5;
    let offset = (digit - base.rem_euclid(10)).rem_euclid(10);
    base + offset
}

/// A calendar month identifying a futures/option expiration series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractMonth {
    pub year: i32,
    pub month: u32,
}

impl ContractMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, InputError> {
        if !(1..=12).contains(&month) {
            return Err(InputError::InvalidMonth { month });
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Shift forward by `months`, wrapping year boundaries.
    pub fn add_months(&self, months: u32) -> Self {
        let index = self.month_index() + months as i64;
        Self::from_index(index)
    }

    /// Shift backward by `months`, wrapping year boundaries.
    pub fn sub_months(&self, months: u32) -> Self {
        let index = self.month_index() - months as i64;
        Self::from_index(index)
    }

    pub fn next(&self) -> Self {
        self.add_months(1)
    }

    pub fn previous(&self) -> Self {
        self.sub_months(1)
    }

    fn month_index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("ContractMonth always holds a valid month")
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .expect("month start always has a predecessor")
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn code(&self) -> char {
        MONTH_CODES[(self.month - 1) as usize]
    }

    pub fn year_digit(&self) -> u32 {
        self.year.rem_euclid(10) as u32
    }

    /// Futures contract symbol, e.g. `OHF2`.
    pub fn futures_symbol(&self, root: &str) -> String {
        format!("{}{}{}", root, self.code(), self.year_digit())
    }
}

impl fmt::Display for ContractMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

fn scaled_strike(strike: Decimal) -> Result<i64, InputError> {
    let invalid = |reason: &str| InputError::Invalid {
        message: format!("strike {strike} {reason}"),
    };
    if strike <= Decimal::ZERO {
        return Err(invalid("must be positive"));
    }
    if strike.normalize().scale() > 2 {
        return Err(invalid("has more than two decimal places"));
    }
    strike
        .checked_mul(Decimal::from(STRIKE_SYMBOL_SCALE))
        .and_then(|scaled| scaled.to_i64())
        .ok_or_else(|| invalid("does not fit a symbol strike code"))
}

/// Exchange-style call option symbol: `<ROOT><MONTH_CODE><YEAR_DIGIT> C<STRIKE*100>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionSymbol {
    pub root: String,
    pub expiration: ContractMonth,
    pub strike: Decimal,
}

impl OptionSymbol {
    /// Build a call symbol. The strike must be positive with at most two
    /// decimal places, so it maps exactly onto the scaled integer code.
    pub fn call(root: &str, expiration: ContractMonth, strike: Decimal) -> Result<Self, InputError> {
        scaled_strike(strike)?;
        Ok(Self {
            root: root.to_string(),
            expiration,
            strike,
        })
    }

    /// Strike as the scaled integer that appears in the symbol.
    pub fn strike_code(&self) -> Result<i64, InputError> {
        scaled_strike(self.strike)
    }

    /// Parse a symbol, resolving its one-digit year against `reference_year`.
    pub fn parse(symbol: &str, reference_year: i32) -> Result<Self, InputError> {
        let malformed = |reason: &str| InputError::MalformedSymbol {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        };

        let (contract, option) = symbol
            .trim()
            .split_once(' ')
            .ok_or_else(|| malformed("missing space between contract and strike"))?;

        let chars: Vec<char> = contract.chars().collect();
        if chars.len() < 3 {
            return Err(malformed("contract part too short"));
        }
        let digit = chars[chars.len() - 1]
            .to_digit(10)
            .ok_or_else(|| malformed("year code must be a single digit"))?;
        let month = month_from_code(chars[chars.len() - 2])
            .ok_or_else(|| malformed("unknown month code"))?;
        let root: String = chars[..chars.len() - 2].iter().collect();
        if root.is_empty() || !root.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(malformed("root must be upper-case letters"));
        }

        let raw = option
            .strip_prefix('C')
            .ok_or_else(|| malformed("only call options ('C') are supported"))?;
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed("strike must be digits"));
        }
        let raw: i64 = raw.parse().map_err(|_| malformed("strike out of range"))?;

        if raw == 0 {
            return Err(malformed("strike must be positive"));
        }

        Ok(Self {
            root,
            expiration: ContractMonth::new(resolve_year_digit(digit, reference_year), month)?,
            strike: Decimal::new(raw, 2),
        })
    }
}

impl fmt::Display for OptionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contract = self.expiration.futures_symbol(&self.root);
        match self.strike_code() {
            Ok(code) => write!(f, "{contract} C{code:05}"),
            // hand-built symbol with an unrepresentable strike
            Err(_) => write!(f, "{contract} C?{}", self.strike),
        }
    }
}

/// Front-month futures quote on a single trading date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnderlyingQuote {
    pub date: NaiveDate,
    pub price: Decimal,
}
