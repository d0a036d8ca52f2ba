//! Trading calendar and inclusive date ranges.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::InputError;
use crate::market::ContractMonth;

/// Inclusive calendar-date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InputError> {
        if start > end {
            return Err(InputError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Ordered set of trading dates covering a queried range.
///
/// Dates are strictly increasing and never fall on a weekend. Built once per
/// run and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCalendar {
    range: DateRange,
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build from provider output, enforcing the calendar invariants.
    pub fn new(range: DateRange, days: Vec<NaiveDate>) -> Result<Self, InputError> {
        for pair in days.windows(2) {
            if pair[0] >= pair[1] {
                return Err(InputError::Calendar {
                    message: format!(
                        "trading days must be strictly increasing ({} then {})",
                        pair[0], pair[1]
                    ),
                });
            }
        }
        if let Some(day) = days
            .iter()
            .find(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        {
            return Err(InputError::Calendar {
                message: format!("{day} is a weekend"),
            });
        }
        if let Some(day) = days.iter().find(|d| !range.contains(**d)) {
            return Err(InputError::Calendar {
                message: format!("{day} lies outside {} ..= {}", range.start, range.end),
            });
        }
        Ok(Self { range, days })
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.binary_search(&date).is_ok()
    }

    /// Trading days inside `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        if start > end {
            return &[];
        }
        let lo = self.days.partition_point(|d| *d < start);
        let hi = self.days.partition_point(|d| *d <= end);
        &self.days[lo..hi]
    }

    /// Number of trading days inside `[start, end]`.
    pub fn count_between(&self, start: NaiveDate, end: NaiveDate) -> usize {
        self.between(start, end).len()
    }

    /// First trading day on or after `date`.
    pub fn first_on_or_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.days.partition_point(|d| *d < date);
        self.days.get(idx).copied()
    }

    /// Last trading day on or before `date`.
    pub fn last_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.days.partition_point(|d| *d <= date);
        idx.checked_sub(1).map(|i| self.days[i])
    }

    /// First trading day of `month`, if the calendar covers one.
    ///
    /// Returns `None` when the month's first calendar day precedes the
    /// calendar range, since an earlier trading day could exist unseen.
    pub fn first_in_month(&self, month: ContractMonth) -> Option<NaiveDate> {
        if month.first_day() < self.range.start {
            return None;
        }
        self.first_on_or_after(month.first_day())
            .filter(|d| month.contains(*d))
    }

    /// Last trading day of `month`, if the calendar covers one.
    pub fn last_in_month(&self, month: ContractMonth) -> Option<NaiveDate> {
        if month.last_day() > self.range.end {
            return None;
        }
        self.last_on_or_before(month.last_day())
            .filter(|d| month.contains(*d))
    }
}
