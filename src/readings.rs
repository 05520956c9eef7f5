//! External recovery readings: manual recording and coverage checks.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::db::models::ExternalReading;
use crate::db::{Database, DbError};
use crate::scoring::external::modifier_from_readings;
use crate::scoring::window_start;

#[derive(Error, Debug)]
pub enum ReadingError {
    #[error("Invalid {field} reading: {value}")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, ReadingError>;

/// Longest window `coverage` will walk, about ten years.
pub const MAX_COVERAGE_DAYS: u32 = 3660;

/// How many recent days have a reading.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingCoverage {
    pub days: u32,
    pub covered: u32,
    pub fraction: f64,
    /// Days in the window without a reading, ascending.
    pub missing_dates: Vec<NaiveDate>,
    pub latest: Option<NaiveDate>,
}

/// Store the reading for `date`, replacing any earlier one. Returns the
/// modifier it produces.
///
/// The daily score for `date` is not recomputed here.
pub fn record_reading(
    db: &Database,
    date: NaiveDate,
    sleep: Option<f64>,
    hrv: Option<f64>,
    recovery: Option<f64>,
) -> Result<f64> {
    for (field, value) in [("sleep", sleep), ("hrv", hrv), ("recovery", recovery)] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(ReadingError::InvalidValue { field, value: v });
            }
        }
    }

    let reading = ExternalReading { date, sleep, hrv, recovery };
    let modifier = modifier_from_readings(sleep, hrv, recovery);
    db.upsert_external_reading(&reading, modifier)?;
    log::info!("Recorded reading for {date}: modifier {modifier:.2}");
    Ok(modifier)
}

/// Reading coverage over the `days` days ending at `today`. The window is
/// capped at [`MAX_COVERAGE_DAYS`] and at the earliest representable date;
/// `days` in the result is the window actually covered.
pub fn coverage(db: &Database, today: NaiveDate, days: u32) -> Result<ReadingCoverage> {
    let latest = db.latest_reading_date()?;
    if days == 0 {
        return Ok(ReadingCoverage {
            days,
            covered: 0,
            fraction: 0.0,
            missing_dates: Vec::new(),
            latest,
        });
    }

    if days > MAX_COVERAGE_DAYS {
        log::debug!("Coverage window of {days} days capped at {MAX_COVERAGE_DAYS}");
    }
    let start = window_start(today, u64::from(days.min(MAX_COVERAGE_DAYS)));
    let window: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= today).collect();
    let days = window.len() as u32;

    let present: HashSet<NaiveDate> = db.reading_dates_between(start, today)?.into_iter().collect();
    let missing_dates: Vec<NaiveDate> = window.into_iter().filter(|d| !present.contains(d)).collect();

    let covered = days - missing_dates.len() as u32;
    Ok(ReadingCoverage {
        days,
        covered,
        fraction: f64::from(covered) / f64::from(days),
        missing_dates,
        latest,
    })
}
