use chrono::{Datelike, Duration, NaiveDate};

use crate::calendar::{CalendarError, JalaaliDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekBounds {
    pub start: JalaaliDate,
    pub end: JalaaliDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthBounds {
    pub start: JalaaliDate,
    pub end: JalaaliDate,
    pub days_in_month: u32,
}

/// Days elapsed since the most recent Saturday, counting `today` itself as 0
/// when it is a Saturday.
pub fn days_since_saturday(today: NaiveDate) -> u32 {
    (today.weekday().num_days_from_monday() + 2) % 7
}

/// Saturday-to-Friday week containing `today`.
pub fn current_week_bounds(today: NaiveDate) -> Result<WeekBounds, CalendarError> {
    let start = today - Duration::days(days_since_saturday(today) as i64);
    let end = start + Duration::days(6);
    Ok(WeekBounds {
        start: JalaaliDate::from_gregorian(start)?,
        end: JalaaliDate::from_gregorian(end)?,
    })
}

/// Jalaali month containing `today`. Esfand has 30 days in leap years.
pub fn current_month_bounds(today: NaiveDate) -> Result<MonthBounds, CalendarError> {
    let current = JalaaliDate::from_gregorian(today)?;
    Ok(MonthBounds {
        start: current.first_of_month(),
        end: current.last_of_month(),
        days_in_month: current.days_in_month(),
    })
}
