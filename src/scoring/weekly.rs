//! Rolling 7-day completion rate and the qualitative tier derived from it.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::store::{ScoreStore, StoreResult};

/// Length of the trailing completion window, inclusive of the target date.
pub const WINDOW_DAYS: u64 = 7;

/// Completion rate at or below this is a `Fail` rather than a `Miss`.
const MISS_FLOOR: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeeklyTier {
    Exceed,
    Meet,
    Close,
    Miss,
    Fail,
}

impl WeeklyTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exceed => "exceed",
            Self::Meet => "meet",
            Self::Close => "close",
            Self::Miss => "miss",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for WeeklyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Classify completed days in the window against a weekly target.
///
/// Compared in whole days so boundaries such as `target - forgiveness` are
/// exact. `Exceed` is checked before `Meet`, so `Meet` only fires when the
/// count is exactly the target. Momentum depends on that ordering.
pub fn classify(completed_days: u32, target_days: u32, forgiveness_days: u32) -> WeeklyTier {
    if completed_days > target_days {
        WeeklyTier::Exceed
    } else if completed_days >= target_days {
        WeeklyTier::Meet
    } else if completed_days >= target_days.saturating_sub(forgiveness_days) {
        WeeklyTier::Close
    } else if rate(completed_days) > MISS_FLOOR {
        WeeklyTier::Miss
    } else {
        WeeklyTier::Fail
    }
}

/// Completed days as a fraction of the window.
pub fn rate(completed_days: u32) -> f64 {
    completed_days as f64 / WINDOW_DAYS as f64
}

/// Number of values that are strictly positive.
pub fn completed_days_from_values<I>(values: I) -> u32
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().filter(|v| *v > 0.0).count() as u32
}

/// First date of the window ending at `date`.
pub fn window_start(date: NaiveDate) -> NaiveDate {
    super::window_start(date, WINDOW_DAYS)
}

/// Completed days in `[date - 6, date]` from stored entries.
pub fn completed_days<S: ScoreStore>(store: &S, habit_id: i64, date: NaiveDate) -> StoreResult<u32> {
    let entries = store.entries_between(habit_id, window_start(date), date)?;
    Ok(completed_days_from_values(entries.iter().map(|e| e.value)))
}
