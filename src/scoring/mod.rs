//! The scoring pipeline: raw tier → weekly tier → momentum → daily aggregate.
//!
//! Everything here is synchronous and stateless between calls; state lives in
//! the [`store::ScoreStore`] the caller passes in.

pub mod daily;
pub mod external;
pub mod momentum;
pub mod raw;
pub mod store;
pub mod weekly;

use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::db::DbError;

pub use daily::{compute_score_for_date, recompute_range, RecomputeResult};

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Habit {0} not found")]
    HabitNotFound(i64),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, ScoreError>;

/// First date of the `days`-long window ending at `end` (inclusive), clamped
/// to the earliest representable date. A zero-length window starts at `end`.
pub fn window_start(end: NaiveDate, days: u64) -> NaiveDate {
    end.checked_sub_days(Days::new(days.saturating_sub(1)))
        .unwrap_or(NaiveDate::MIN)
}
