//! Monthly roll schedule.

use chrono::NaiveDate;
use tracing::debug;

use dr_types::{ContractMonth, InputError, RollEvent, RollResult, TradingCalendar};

/// One roll per calendar month whose first trading day lies in `[start, end]`.
///
/// The roll date is that first trading day; the target expiration is the
/// roll month shifted by `months_ahead`. Months whose first trading day
/// precedes `start` get no event. The calendar must cover `end` and the first
/// day of `start`'s month.
pub fn schedule_rolls(
    start: NaiveDate,
    end: NaiveDate,
    months_ahead: u32,
    calendar: &TradingCalendar,
) -> RollResult<Vec<RollEvent>> {
    if start > end {
        return Err(InputError::InvalidDateRange { start, end }.into());
    }
    let first_month = ContractMonth::of(start);
    let range = calendar.range();
    if range.start > first_month.first_day() || range.end < end {
        return Err(InputError::Calendar {
            message: format!(
                "calendar {} ..= {} does not cover {} ..= {}",
                range.start,
                range.end,
                first_month.first_day(),
                end
            ),
        }
        .into());
    }

    let last_month = ContractMonth::of(end);
    let mut events = Vec::new();
    let mut month = first_month;

    while month <= last_month {
        if let Some(roll_date) = calendar.first_in_month(month) {
            if roll_date >= start && roll_date <= end {
                events.push(RollEvent {
                    ordinal: events.len(),
                    roll_date,
                    current_month: month,
                    target_month: month.add_months(months_ahead),
                    months_ahead,
                });
            }
        }
        month = month.next();
    }

    debug!(
        start = %start,
        end = %end,
        months_ahead,
        events = events.len(),
        "Scheduled rolls"
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_data::{build_calendar, UsFederalCalendar, WeekdayCalendar};
    use dr_types::DateRange;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekdays(start: NaiveDate, end: NaiveDate) -> TradingCalendar {
        build_calendar(&WeekdayCalendar, DateRange::new(start, end).unwrap()).unwrap()
    }

    #[test]
    fn test_one_event_per_month_on_first_trading_day() {
        let cal = weekdays(date(2021, 12, 1), date(2022, 6, 30));
        let events = schedule_rolls(date(2021, 12, 1), date(2022, 3, 31), 2, &cal).unwrap();

        let dates: Vec<_> = events.iter().map(|e| e.roll_date).collect();
        assert_eq!(
            dates,
            vec![date(2021, 12, 1), date(2022, 1, 3), date(2022, 2, 1), date(2022, 3, 1)]
        );
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.ordinal, i);
            assert_eq!(e.target_month, e.current_month.add_months(2));
        }
        // year wrap: Dec 2021 + 2 = Feb 2022
        assert_eq!(events[0].target_month, ContractMonth::new(2022, 2).unwrap());
        assert_eq!(events[0].target_contract("OH"), "OHG2");
    }

    #[test]
    fn test_strictly_increasing_over_long_range() {
        let cal = weekdays(date(2019, 1, 1), date(2024, 12, 31));
        let events = schedule_rolls(date(2019, 1, 1), date(2024, 12, 31), 1, &cal).unwrap();
        assert_eq!(events.len(), 72);
        for pair in events.windows(2) {
            assert!(pair[0].roll_date < pair[1].roll_date);
            assert_eq!(pair[0].current_month.next(), pair[1].current_month);
        }
        for e in &events {
            assert_eq!(cal.first_in_month(e.current_month), Some(e.roll_date));
        }
    }

    #[test]
    fn test_no_retroactive_event_for_start_month() {
        let cal = weekdays(date(2022, 1, 1), date(2022, 4, 30));
        let events = schedule_rolls(date(2022, 1, 15), date(2022, 3, 31), 2, &cal).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].roll_date, date(2022, 2, 1));
    }

    #[test]
    fn test_weekend_start_still_rolls_on_first_trading_day() {
        // Jan 1-2 2022 is a weekend; Jan 3 is the first trading day
        let cal = weekdays(date(2022, 1, 1), date(2022, 2, 28));
        let events = schedule_rolls(date(2022, 1, 2), date(2022, 2, 28), 2, &cal).unwrap();
        assert_eq!(events[0].roll_date, date(2022, 1, 3));
    }

    #[test]
    fn test_holiday_shifts_roll_date() {
        let range = DateRange::new(date(2025, 8, 1), date(2025, 9, 30)).unwrap();
        let cal = build_calendar(&UsFederalCalendar, range).unwrap();
        let events = schedule_rolls(date(2025, 8, 1), date(2025, 9, 30), 2, &cal).unwrap();
        assert_eq!(events[1].roll_date, date(2025, 9, 2));
    }

    #[test]
    fn test_end_before_month_start_trading_day() {
        let cal = weekdays(date(2022, 1, 1), date(2022, 3, 31));
        // Feb 1 is after the end date
        let events = schedule_rolls(date(2022, 1, 1), date(2022, 1, 31), 2, &cal).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_invalid_range_and_short_calendar() {
        let cal = weekdays(date(2022, 1, 1), date(2022, 3, 31));
        assert!(schedule_rolls(date(2022, 3, 1), date(2022, 1, 1), 2, &cal).is_err());
        assert!(schedule_rolls(date(2022, 1, 1), date(2022, 6, 30), 2, &cal).is_err());
        assert!(schedule_rolls(date(2021, 12, 15), date(2022, 2, 1), 2, &cal).is_err());
    }
}
