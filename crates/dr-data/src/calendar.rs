//! Exchange calendars and the helper that turns provider output into a
//! validated [`TradingCalendar`].

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;
use tracing::debug;

use dr_types::{DataResult, DateRange, RollResult, TradingCalendar};

use crate::providers::CalendarProvider;

/// Fetch trading days for `range` and validate them.
pub fn build_calendar(provider: &dyn CalendarProvider, range: DateRange) -> RollResult<TradingCalendar> {
    let days = provider.trading_days_between(range.start, range.end)?;
    debug!(
        provider = provider.name(),
        start = %range.start,
        end = %range.end,
        days = days.len(),
        "Built trading calendar"
    );
    Ok(TradingCalendar::new(range, days)?)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Monday to Friday, no holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdayCalendar;

impl CalendarProvider for WeekdayCalendar {
    fn name(&self) -> &str {
        "weekdays"
    }

    fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> DataResult<Vec<NaiveDate>> {
        Ok(start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !is_weekend(*d))
            .collect())
    }
}

/// Weekdays minus US federal holidays.
///
/// Fixed-date holidays falling on a Saturday are observed the Friday before,
/// on a Sunday the Monday after.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsFederalCalendar;

impl UsFederalCalendar {
    /// Observed holiday dates for `year` (may include Dec 31 of `year - 1`
    /// when New Year's Day is a Saturday, which is reported under that year).
    pub fn holidays(year: i32) -> Vec<NaiveDate> {
        let mut days = Vec::with_capacity(11);
        let mut fixed = |month: u32, day: u32| {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                days.push(observed(date));
            }
        };
        fixed(1, 1);
        if year >= 2021 {
            fixed(6, 19);
        }
        fixed(7, 4);
        fixed(11, 11);
        fixed(12, 25);

        let floating = [
            nth_weekday(year, 1, Weekday::Mon, 3),  // Martin Luther King Jr. Day
            nth_weekday(year, 2, Weekday::Mon, 3),  // Washington's Birthday
            last_weekday(year, 5, Weekday::Mon),    // Memorial Day
            nth_weekday(year, 9, Weekday::Mon, 1),  // Labor Day
            nth_weekday(year, 10, Weekday::Mon, 2), // Columbus Day
            nth_weekday(year, 11, Weekday::Thu, 4), // Thanksgiving
        ];
        days.extend(floating.into_iter().flatten());
        days.sort();
        days
    }

    fn holiday_set(start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        // next year's New Year's Day can be observed on Dec 31
        (start.year()..=end.year() + 1)
            .flat_map(Self::holidays)
            .filter(|d| *d >= start && *d <= end)
            .collect()
    }
}

impl CalendarProvider for UsFederalCalendar {
    fn name(&self) -> &str {
        "us-federal"
    }

    fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> DataResult<Vec<NaiveDate>> {
        if start > end {
            return Ok(Vec::new());
        }
        let holidays = Self::holiday_set(start, end);
        Ok(start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !is_weekend(*d) && !holidays.contains(d))
            .collect())
    }
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date.pred_opt().unwrap_or(date),
        Weekday::Sun => date.succ_opt().unwrap_or(date),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}
