//! Computes the next due instant of a recurring rule.
//!
//! Monthly schedules clamp to the end of short months: the 31st of January
//! plus one month is the 28th (or 29th) of February. The result only depends
//! on the current due instant, so a schedule that has been clamped stays on
//! the clamped day from then on.

use time::{Date, Month, OffsetDateTime, UtcOffset};

use crate::{Error, recurring::rule::Frequency};

/// Get the due instant that follows `current_due` for a rule repeating every
/// `interval` units of `frequency`.
///
/// The calculation is done in UTC and the time of day is kept. An `interval`
/// below 1 is treated as 1.
///
/// # Errors
/// Returns [Error::ScheduleOutOfRange] if the next instant cannot be
/// represented.
pub fn advance(
    current_due: OffsetDateTime,
    frequency: Frequency,
    interval: i64,
) -> Result<OffsetDateTime, Error> {
    let current_due = current_due.to_offset(UtcOffset::UTC);
    let interval = interval.max(1);

    let next_date = match frequency {
        Frequency::Daily => add_days(current_due.date(), interval),
        Frequency::Weekly => interval
            .checked_mul(7)
            .and_then(|days| add_days(current_due.date(), days)),
        Frequency::Monthly => add_months(current_due.date(), interval),
    }
    .ok_or(Error::ScheduleOutOfRange)?;

    Ok(current_due.replace_date(next_date))
}

fn add_days(date: Date, days: i64) -> Option<Date> {
    let julian_day = i64::from(date.to_julian_day()).checked_add(days)?;

    Date::from_julian_day(i32::try_from(julian_day).ok()?).ok()
}

fn add_months(date: Date, months: i64) -> Option<Date> {
    let month_index = i64::from(date.year())
        .checked_mul(12)?
        .checked_add(i64::from(u8::from(date.month()) - 1))?
        .checked_add(months)?;

    let year = i32::try_from(month_index.div_euclid(12)).ok()?;
    let month = Month::try_from((month_index.rem_euclid(12) + 1) as u8).ok()?;
    let day = date.day().min(last_day_of_month(year, month));

    Date::from_calendar_date(year, month, day).ok()
}

fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
