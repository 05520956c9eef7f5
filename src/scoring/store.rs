//! Data-access seam between the scoring core and persistence.
//!
//! The core never touches SQL directly; everything it reads or writes goes
//! through [`ScoreStore`], keyed by `(habit_id, date)` or `date` alone.

use chrono::NaiveDate;

use crate::db::models::{DailyScore, ExternalReading, Habit, HabitEntry, HabitScore};
use crate::db::DbError;

pub type StoreResult<T> = std::result::Result<T, DbError>;

pub trait ScoreStore {
    /// Active habits in a stable order (ascending id).
    fn active_habits(&self) -> StoreResult<Vec<Habit>>;

    /// Any habit by id, active or not.
    fn habit(&self, habit_id: i64) -> StoreResult<Option<Habit>>;

    fn entry_value(&self, habit_id: i64, date: NaiveDate) -> StoreResult<Option<f64>>;

    /// Entries for a habit with `start <= date <= end`, ascending by date.
    fn entries_between(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<HabitEntry>>;

    fn habit_score(&self, habit_id: i64, date: NaiveDate) -> StoreResult<Option<HabitScore>>;

    /// Stored habit scores with `start <= date <= end`, ascending by date.
    fn habit_scores_between(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<HabitScore>>;

    fn upsert_habit_score(&self, score: &HabitScore) -> StoreResult<()>;

    fn daily_score(&self, date: NaiveDate) -> StoreResult<Option<DailyScore>>;

    fn upsert_daily_score(&self, score: &DailyScore) -> StoreResult<()>;

    fn external_reading(&self, date: NaiveDate) -> StoreResult<Option<ExternalReading>>;

    /// Run `f` as one write transaction. Writers for the same date are
    /// serialized; an `Err` from `f` rolls everything back.
    fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        Self: Sized,
        E: From<DbError>,
        F: FnOnce(&Self) -> std::result::Result<T, E>;
}
