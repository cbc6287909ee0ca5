//! UTC calendar arithmetic for renewal scheduling.
//!
//! All date math in the engine goes through this module so that clamping
//! and truncation behave identically everywhere. Operations are pure and
//! total: arithmetic that would leave chrono's representable range
//! saturates at the calendar horizon instead of panicking.
//!
//! Month arithmetic uses standard last-day clamping: Jan 31 + 1 month is
//! Feb 28 (or Feb 29 in a leap year).

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};

/// First instant of the calendar month following `t`.
#[must_use]
pub fn start_of_next_month(t: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    first_midnight(year, month)
}

/// First instant of the calendar quarter following the one containing `t`.
#[must_use]
pub fn start_of_next_quarter(t: DateTime<Utc>) -> DateTime<Utc> {
    let next_quarter_month = ((t.month() - 1) / 3) * 3 + 4;
    if next_quarter_month > 12 {
        first_midnight(t.year() + 1, 1)
    } else {
        first_midnight(t.year(), next_quarter_month)
    }
}

/// First instant of the calendar year following `t`.
#[must_use]
pub fn start_of_next_year(t: DateTime<Utc>) -> DateTime<Utc> {
    first_midnight(t.year() + 1, 1)
}

/// Truncates `t` to 00:00:00 UTC of the same calendar day.
#[must_use]
pub fn to_date(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Adds `n` calendar months with last-day clamping.
#[must_use]
pub fn add_months(t: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    t.checked_add_months(Months::new(n))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Adds `n` calendar years with Feb 29 clamping.
#[must_use]
pub fn add_years(t: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    add_months(t, n.saturating_mul(12))
}

/// Number of whole calendar months from `start` to `end`.
///
/// Returns 0 when `end <= start`. Clamped month ends count as whole
/// months: Jan 31 -> Feb 28 is one month.
#[must_use]
pub fn whole_months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    if end <= start {
        return 0;
    }
    let span = i64::from(end.year() - start.year()) * 12
        + i64::from(end.month() as i32 - start.month() as i32);
    if span <= 0 {
        return 0;
    }
    let mut months = u32::try_from(span).unwrap_or(u32::MAX);
    if add_months(start, months) > end {
        months -= 1;
    }
    months
}

fn first_midnight(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map_or(DateTime::<Utc>::MAX_UTC, |d| {
            d.and_time(NaiveTime::MIN).and_utc()
        })
}
