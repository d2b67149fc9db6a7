//! Attendance date selection and the labels shown for it.

use chrono::{DateTime, NaiveDate, TimeZone};
use thiserror::Error;

/// Wire format for `attendance_date`.
pub const ISO_DATE: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    Invalid(String),
    #[error("{date} is after today ({today})")]
    InFuture { date: NaiveDate, today: NaiveDate },
}

/// Resolve the caller's date choice. `None` selects today; future dates are refused.
pub fn selected_date(input: Option<&str>, today: NaiveDate) -> Result<NaiveDate, DateError> {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(today);
    };
    let date =
        NaiveDate::parse_from_str(raw, ISO_DATE).map_err(|_| DateError::Invalid(raw.to_string()))?;
    if date > today {
        return Err(DateError::InFuture { date, today });
    }
    Ok(date)
}

/// Label used in roster entries: `Today` or the ISO date.
pub fn roster_label(selected: NaiveDate, today: NaiveDate) -> String {
    if selected == today {
        "Today".to_string()
    } else {
        selected.format(ISO_DATE).to_string()
    }
}

/// Header label for the date picker: `Today` or e.g. `Mon, Jan 6, 2025`.
pub fn display_label(selected: NaiveDate, today: NaiveDate) -> String {
    if selected == today {
        "Today".to_string()
    } else {
        selected.format("%a, %b %-d, %Y").to_string()
    }
}

/// Wall-clock time as shown next to a roster entry, e.g. `2:03:22 PM`.
pub fn clock_label<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%-I:%M:%S %p").to_string()
}
