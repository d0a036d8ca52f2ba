//! Deterministic synthetic heating-oil market for demos and tests.

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use dr_options::{black_scholes_call, expiry_for, years_to_expiry, PricingInput};
use dr_types::{ContractMonth, DataError, DataResult, DateRange, OptionSymbol, RollResult, TradingCalendar};

use crate::calendar::{build_calendar, WeekdayCalendar};
use crate::providers::{CalendarProvider, ChainEntry, ChainProvider, HistoryProvider, QuoteProvider};

const STRIKE_STEP: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
const STRIKES_EACH_SIDE: i64 = 30;
/// Furthest listed expiration, in months after the trade date.
const LISTED_MONTHS: u32 = 12;

/// Synthetic market: a random-walk underlying, listed strikes every 0.05 and
/// option prices from Black-Scholes. Some series skip trading on some days.
#[derive(Debug, Clone)]
pub struct SampleMarketData {
    pub name: String,
    root: String,
    volatility: f64,
    risk_free_rate: f64,
    calendar: TradingCalendar,
    underlying: BTreeMap<NaiveDate, Decimal>,
    /// Trading-day ordinal per date, used to spread no-trade days.
    ordinals: HashMap<NaiveDate, u64>,
}

impl SampleMarketData {
    /// Generate a market covering `range` plus enough forward calendar for
    /// every listed expiration.
    pub fn new(root: &str, range: DateRange) -> RollResult<Self> {
        Self::with_seed(root, range, 12345)
    }

    pub fn with_seed(root: &str, range: DateRange, seed: u64) -> RollResult<Self> {
        let horizon = ContractMonth::of(range.end).add_months(LISTED_MONTHS + 1).last_day();
        let calendar = build_calendar(&WeekdayCalendar, DateRange::new(range.start, horizon)?)?;

        let mut underlying = BTreeMap::new();
        let mut ordinals = HashMap::new();
        let mut price = 2.50_f64;
        let mut rng_state = seed;

        for (i, day) in calendar.days().iter().enumerate() {
            rng_state = rng_state.wrapping_mul(1103515245).wrapping_add(12345);
            let random = ((rng_state >> 16) & 0xffff) as f64 / 65536.0 - 0.5; // -0.5 to 0.5
            price = (price * (1.0 + random * 0.04)).max(0.25);

            let quote = Decimal::from_f64(price).unwrap_or_default().round_dp(4);
            underlying.insert(*day, quote);
            ordinals.insert(*day, i as u64);
        }
        debug!(root, days = calendar.len(), seed, "Generated sample market");

        Ok(Self {
            name: "Sample Data Provider".to_string(),
            root: root.to_string(),
            volatility: 0.30,
            risk_free_rate: 0.05,
            calendar,
            underlying,
            ordinals,
        })
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    fn check_root(&self, root: &str) -> DataResult<()> {
        if root == self.root {
            Ok(())
        } else {
            Err(DataError::not_available(format!("sample market has no root {root}")))
        }
    }

    fn is_listed(&self, expiration: ContractMonth, date: NaiveDate) -> bool {
        let month = ContractMonth::of(date);
        expiration > month && expiration <= month.add_months(LISTED_MONTHS)
    }

    /// Deterministic no-trade days: roughly one series-day in seven.
    fn traded(&self, strike: Decimal, date: NaiveDate) -> bool {
        // a strike with no symbol code is not a listed series
        let Some(code) = (strike * Decimal::ONE_HUNDRED).round().to_i64() else {
            return false;
        };
        let ordinal = self.ordinals.get(&date).copied().unwrap_or(0);
        let mix = (code as u64).wrapping_mul(2654435761) ^ ordinal.wrapping_mul(40503);
        mix % 7 != 0
    }

    fn option_price(&self, symbol: &OptionSymbol, date: NaiveDate, expiry: NaiveDate) -> Option<Decimal> {
        let spot = self.underlying.get(&date)?.to_f64()?;
        let years = years_to_expiry(date, expiry, &self.calendar).ok()?;
        let input = PricingInput {
            spot,
            risk_free_rate: self.risk_free_rate,
            volatility: self.volatility,
            time_to_expiry: years,
        };
        let priced = black_scholes_call(symbol.strike, &input).ok()?;
        Some(priced.price.round_dp(4))
    }
}

impl CalendarProvider for SampleMarketData {
    fn name(&self) -> &str {
        &self.name
    }

    fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> DataResult<Vec<NaiveDate>> {
        WeekdayCalendar.trading_days_between(start, end)
    }
}

impl QuoteProvider for SampleMarketData {
    fn quote(&self, root: &str, date: NaiveDate) -> DataResult<Decimal> {
        self.check_root(root)?;
        self.underlying
            .get(&date)
            .copied()
            .ok_or_else(|| DataError::not_available(format!("{root} quote on {date}")))
    }
}

impl ChainProvider for SampleMarketData {
    fn chain(&self, root: &str, expiration: ContractMonth, date: NaiveDate) -> DataResult<Vec<ChainEntry>> {
        self.check_root(root)?;
        let Some(spot) = self.underlying.get(&date).copied() else {
            return Ok(Vec::new());
        };
        if !self.is_listed(expiration, date) {
            return Ok(Vec::new());
        }

        let atm = (spot / STRIKE_STEP).round() * STRIKE_STEP;
        Ok((-STRIKES_EACH_SIDE..=STRIKES_EACH_SIDE)
            .map(|i| atm + STRIKE_STEP * Decimal::from(i))
            .filter(|k| *k > Decimal::ZERO)
            .map(|strike| {
                let entry = ChainEntry::new(strike);
                if self.traded(strike, date) {
                    entry
                } else {
                    entry.not_traded()
                }
            })
            .collect())
    }
}

impl HistoryProvider for SampleMarketData {
    fn history(&self, symbol: &OptionSymbol, range: DateRange) -> DataResult<BTreeMap<NaiveDate, Decimal>> {
        let expiry = expiry_for(symbol.expiration, &self.calendar).map_err(|e| DataError::Provider {
            provider: self.name.clone(),
            message: e.to_string(),
        })?;
        let end = range.end.min(expiry);

        Ok(self
            .calendar
            .between(range.start, end)
            .iter()
            .filter(|d| self.traded(symbol.strike, **d))
            .filter_map(|d| self.option_price(symbol, *d, expiry).map(|p| (*d, p)))
            .collect())
    }
}
