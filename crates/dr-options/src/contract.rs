use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use dr_types::{ContractMonth, InputError, OptionSymbol, TradingCalendar};

/// Trading days per year used to annualise time to expiry.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Last trading day of the option (and its futures contract) for `month`.
///
/// Energy futures stop trading on the last business day of the month
/// preceding the contract month, and their options expire with them.
pub fn expiry_for(month: ContractMonth, calendar: &TradingCalendar) -> Result<NaiveDate, InputError> {
    let previous = month.previous();
    calendar
        .last_in_month(previous)
        .ok_or_else(|| InputError::Calendar {
            message: format!(
                "calendar {} ..= {} does not cover expiry month {} of contract {}",
                calendar.range().start,
                calendar.range().end,
                previous,
                month
            ),
        })
}

/// Years between `roll_date` and `expiry`, counted in trading days inclusive.
///
/// Floored at one trading day so an instrument rolled on its expiry still
/// has a finite delta. An expiry before the roll date is rejected.
pub fn years_to_expiry(
    roll_date: NaiveDate,
    expiry: NaiveDate,
    calendar: &TradingCalendar,
) -> Result<f64, InputError> {
    if expiry < roll_date {
        return Err(InputError::InvalidDateRange {
            start: roll_date,
            end: expiry,
        });
    }
    let days = calendar.count_between(roll_date, expiry).max(1);
    Ok(days as f64 / TRADING_DAYS_PER_YEAR)
}

/// A listed call on a futures contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: OptionSymbol,
    /// Underlying futures contract, e.g. `OHG2`.
    pub underlying_contract: String,
    pub expiry_date: NaiveDate,
}

impl OptionContract {
    pub fn new(symbol: OptionSymbol, expiry_date: NaiveDate) -> Self {
        Self {
            underlying_contract: symbol.expiration.futures_symbol(&symbol.root),
            symbol,
            expiry_date,
        }
    }

    /// Build the call for `expiration`, taking its expiry from `calendar`.
    pub fn call(
        option_root: &str,
        expiration: ContractMonth,
        strike: Decimal,
        calendar: &TradingCalendar,
    ) -> Result<Self, InputError> {
        let expiry_date = expiry_for(expiration, calendar)?;
        Ok(Self::new(OptionSymbol::call(option_root, expiration, strike)?, expiry_date))
    }

    pub fn strike(&self) -> Decimal {
        self.symbol.strike
    }

    pub fn is_expired(&self, date: NaiveDate) -> bool {
        date > self.expiry_date
    }

    /// Time to expiry in years from `date`.
    pub fn years_to_expiry(&self, date: NaiveDate, calendar: &TradingCalendar) -> Result<f64, InputError> {
        years_to_expiry(date, self.expiry_date, calendar)
    }
}

impl fmt::Display for OptionContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exp {})", self.symbol, self.expiry_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};
    use dr_types::DateRange;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekdays(start: NaiveDate, end: NaiveDate) -> TradingCalendar {
        let days = start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();
        TradingCalendar::new(DateRange::new(start, end).unwrap(), days).unwrap()
    }

    #[test]
    fn test_expiry_is_last_trading_day_of_prior_month() {
        let cal = weekdays(date(2021, 12, 1), date(2022, 4, 30));
        let feb = ContractMonth::new(2022, 2).unwrap();
        // Jan 31 2022 is a Monday
        assert_eq!(expiry_for(feb, &cal).unwrap(), date(2022, 1, 31));

        let may = ContractMonth::new(2022, 5).unwrap();
        // Apr 30 2022 is a Saturday, so Apr 29
        assert_eq!(expiry_for(may, &cal).unwrap(), date(2022, 4, 29));
    }

    #[test]
    fn test_expiry_outside_calendar_is_error() {
        let cal = weekdays(date(2022, 1, 1), date(2022, 2, 15));
        let apr = ContractMonth::new(2022, 4).unwrap();
        assert!(matches!(
            expiry_for(apr, &cal),
            Err(InputError::Calendar { .. })
        ));
    }

    #[test]
    fn test_years_to_expiry_counts_inclusive_trading_days() {
        let cal = weekdays(date(2022, 1, 1), date(2022, 3, 31));
        // Jan 3 (Mon) .. Jan 7 (Fri) = 5 trading days
        let years = years_to_expiry(date(2022, 1, 3), date(2022, 1, 7), &cal).unwrap();
        assert!((years - 5.0 / 252.0).abs() < 1e-12);
    }

    #[test]
    fn test_years_to_expiry_floor_and_order() {
        let cal = weekdays(date(2022, 1, 1), date(2022, 3, 31));
        // Saturday to Saturday has no trading days but still floors at one
        let years = years_to_expiry(date(2022, 1, 8), date(2022, 1, 8), &cal).unwrap();
        assert!((years - 1.0 / 252.0).abs() < 1e-12);

        assert!(years_to_expiry(date(2022, 2, 1), date(2022, 1, 31), &cal).is_err());
    }

    #[test]
    fn test_option_contract_call() {
        let cal = weekdays(date(2021, 12, 1), date(2022, 3, 31));
        let mar = ContractMonth::new(2022, 3).unwrap();
        let contract = OptionContract::call("OH", mar, dec!(2.78), &cal).unwrap();

        assert_eq!(contract.symbol.to_string(), "OHH2 C00278");
        assert_eq!(contract.underlying_contract, "OHH2");
        assert_eq!(contract.expiry_date, date(2022, 2, 28));
        assert_eq!(contract.strike(), dec!(2.78));
        assert!(!contract.is_expired(date(2022, 2, 28)));
        assert!(contract.is_expired(date(2022, 3, 1)));
        let years = contract.years_to_expiry(date(2022, 2, 22), &cal).unwrap();
        assert!((years - 5.0 / 252.0).abs() < 1e-12);

        assert!(OptionContract::call("OH", mar, dec!(2.785), &cal).is_err());
    }
}
