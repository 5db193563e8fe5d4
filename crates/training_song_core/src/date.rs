//! crates/training_song_core/src/date.rs
//!
//! Maps a percentage onto a calendar date in the 1900s: the integer part
//! selects the year (1900 + offset) and the fractional part selects how far
//! through that year the date lands. Pure function, no I/O.

use chrono::{Days, NaiveDate};

/// The percentage fell outside `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Please enter a percentage between 0 and 100 (got {0})")]
pub struct InvalidPercentage(pub f64);

/// Maps `percentage` in `[0, 100]` to a date in `[1900-01-01, 2000-12-31]`.
///
/// The day offset is `floor(days_in_year * fractional)`, leap-year aware for
/// the selected year. `0` maps to 1900-01-01 and `100` to 2000-01-01.
///
/// Callers passing a fraction in `[0, 1)` must rescale it to a percentage
/// first; that normalization belongs to the orchestrator, not here.
pub fn map_percentage_to_date(percentage: f64) -> Result<NaiveDate, InvalidPercentage> {
    if !(0.0..=100.0).contains(&percentage) {
        return Err(InvalidPercentage(percentage));
    }

    let year_offset = percentage.floor() as i32;
    let fractional = percentage - f64::from(year_offset);
    let year = 1900 + year_offset;

    let days_in_year: u32 = if is_leap_year(year) { 366 } else { 365 };
    let day_offset = (f64::from(days_in_year) * fractional).floor() as u64;

    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|jan_first| jan_first.checked_add_days(Days::new(day_offset)))
        .ok_or(InvalidPercentage(percentage))
}

/// Standard Gregorian rule: divisible by 4 and (not by 100, or by 400).
fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}
