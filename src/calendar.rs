//! Gregorian <-> Jalaali (Persian solar hijri) conversion.
//!
//! The Jalaali leap rule is not a simple modulus, so conversion uses the
//! break-year table of the 33-year sub-cycles (the same table used by the
//! widely deployed `jalaali-js` algorithm). Gregorian dates are handled by
//! chrono; the Jalaali side is anchored on the Julian day number of each
//! year's Nowruz (1 Farvardin).

use std::fmt;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Jalaali years at which the leap cycle length changes.
const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// Julian day number of 0001-01-01 minus one (chrono counts CE days from 1).
const JDN_CE_OFFSET: i64 = 1_721_425;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JalaaliDate {
    year: i32,
    month: u32,
    day: u32,
}

impl JalaaliDate {
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, CalendarError> {
        if !(BREAKS[0]..BREAKS[BREAKS.len() - 1]).contains(&year) {
            return Err(CalendarError::InvalidDate(format!(
                "jalaali year {year} is outside the supported range"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(CalendarError::InvalidDate(format!(
                "month {month} is not in 1..12"
            )));
        }
        let length = month_length(year, month);
        if day == 0 || day > length {
            return Err(CalendarError::InvalidDate(format!(
                "day {day} is not in 1..{length} for {year}/{month:02}"
            )));
        }
        Ok(Self { year, month, day })
    }

    /// Parses `YYYY/MM/DD`, accepting Persian digits and 1-2 digit month/day.
    pub fn parse(raw: &str) -> Result<Self, CalendarError> {
        let normalized = normalize_digits(raw.trim());
        let mut parts = normalized.split('/');
        let (Some(year), Some(month), Some(day), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CalendarError::InvalidDate(format!(
                "expected YYYY/MM/DD, got {raw:?}"
            )));
        };

        let shape_ok = year.len() == 4
            && (1..=2).contains(&month.len())
            && (1..=2).contains(&day.len())
            && [year, month, day]
                .iter()
                .all(|part| part.bytes().all(|b| b.is_ascii_digit()));
        if !shape_ok {
            return Err(CalendarError::InvalidDate(format!(
                "expected YYYY/MM/DD, got {raw:?}"
            )));
        }

        let invalid = || CalendarError::InvalidDate(format!("unparsable date {raw:?}"));
        Self::new(
            year.parse().map_err(|_| invalid())?,
            month.parse().map_err(|_| invalid())?,
            day.parse().map_err(|_| invalid())?,
        )
    }

    pub fn from_gregorian(date: NaiveDate) -> Result<Self, CalendarError> {
        from_julian_day(julian_day(date))
    }

    pub fn to_gregorian(&self) -> Result<NaiveDate, CalendarError> {
        let nowruz = nowruz_julian_day(self.year)?;
        let month = self.month as i64;
        let offset = (month - 1) * 31 - (month / 7) * (month - 7) + self.day as i64 - 1;
        from_julian_day_gregorian(nowruz + offset)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn days_in_month(&self) -> u32 {
        month_length(self.year, self.month)
    }

    pub fn first_of_month(&self) -> Self {
        Self { day: 1, ..*self }
    }

    pub fn last_of_month(&self) -> Self {
        Self {
            day: self.days_in_month(),
            ..*self
        }
    }
}

impl fmt::Display for JalaaliDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

impl std::str::FromStr for JalaaliDate {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn to_jalaali(year: i32, month: u32, day: u32) -> Result<JalaaliDate, CalendarError> {
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        CalendarError::InvalidDate(format!("{year:04}-{month:02}-{day:02} is not a gregorian date"))
    })?;
    JalaaliDate::from_gregorian(date)
}

pub fn to_gregorian(year: i32, month: u32, day: u32) -> Result<NaiveDate, CalendarError> {
    JalaaliDate::new(year, month, day)?.to_gregorian()
}

/// Replaces Persian digit glyphs (U+06F0..U+06F9) with ASCII digits.
pub fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => {
                char::from(b'0' + (c as u32 - '\u{06F0}' as u32) as u8)
            }
            other => other,
        })
        .collect()
}

pub fn is_leap_year(year: i32) -> bool {
    cycle_position(year) == 0
}

pub fn month_length(year: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        12 if is_leap_year(year) => 30,
        _ => 29,
    }
}

fn julian_day(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 + JDN_CE_OFFSET
}

fn from_julian_day_gregorian(jdn: i64) -> Result<NaiveDate, CalendarError> {
    i32::try_from(jdn - JDN_CE_OFFSET)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| CalendarError::InvalidDate(format!("julian day {jdn} is out of range")))
}

fn from_julian_day(jdn: i64) -> Result<JalaaliDate, CalendarError> {
    let gregorian_year = from_julian_day_gregorian(jdn)?.year();
    let mut year = gregorian_year - 621;
    let cycle = year_info(year)?;
    let mut k = jdn - julian_day_of_march(gregorian_year, cycle.march)?;

    if k >= 0 {
        if k <= 185 {
            return JalaaliDate::new(year, 1 + (k / 31) as u32, (k % 31 + 1) as u32);
        }
        k -= 186;
    } else {
        year -= 1;
        k += 179;
        if cycle.leap == 1 {
            k += 1;
        }
    }
    JalaaliDate::new(year, 7 + (k / 30) as u32, (k % 30 + 1) as u32)
}

fn nowruz_julian_day(year: i32) -> Result<i64, CalendarError> {
    let cycle = year_info(year)?;
    julian_day_of_march(year + 621, cycle.march)
}

fn julian_day_of_march(gregorian_year: i32, day: i32) -> Result<i64, CalendarError> {
    let date = u32::try_from(day)
        .ok()
        .and_then(|day| NaiveDate::from_ymd_opt(gregorian_year, 3, day))
        .ok_or_else(|| {
            CalendarError::InvalidDate(format!("no march {day} in gregorian year {gregorian_year}"))
        })?;
    Ok(julian_day(date))
}

struct YearInfo {
    /// Years since the last leap year (0 means this year is leap).
    leap: i32,
    /// Gregorian day of March on which the Jalaali year starts.
    march: i32,
}

fn year_info(year: i32) -> Result<YearInfo, CalendarError> {
    if !(BREAKS[0]..BREAKS[BREAKS.len() - 1]).contains(&year) {
        return Err(CalendarError::InvalidDate(format!(
            "jalaali year {year} is outside the supported range"
        )));
    }

    let gregorian_year = year + 621;
    let mut leap_jalaali = -14;
    let mut previous = BREAKS[0];
    let mut jump = 0;

    for &next in &BREAKS[1..] {
        jump = next - previous;
        if year < next {
            break;
        }
        leap_jalaali += jump / 33 * 8 + (jump % 33) / 4;
        previous = next;
    }

    let n = year - previous;
    leap_jalaali += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_jalaali += 1;
    }

    let leap_gregorian = gregorian_year / 4 - (gregorian_year / 100 + 1) * 3 / 4 - 150;

    Ok(YearInfo {
        leap: cycle_position(year),
        march: 20 + leap_jalaali - leap_gregorian,
    })
}

fn cycle_position(year: i32) -> i32 {
    let mut previous = BREAKS[0];
    let mut jump = 0;
    for &next in &BREAKS[1..] {
        jump = next - previous;
        if year < next {
            break;
        }
        previous = next;
    }

    let mut n = year - previous;
    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let position = ((n + 1) % 33 - 1) % 4;
    if position == -1 {
        4
    } else {
        position
    }
}
