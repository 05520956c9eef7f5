//! Entry ingestion. Every accepted entry triggers a recompute of its date so
//! stored scores never lag behind the values they were derived from.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::{DailyScore, HabitEntry};
use crate::db::{Database, DbError};
use crate::scoring::store::ScoreStore;
use crate::scoring::{compute_score_for_date, ScoreError};

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Habit {0} not found")]
    NotFound(i64),
    #[error("Habit {0} is inactive")]
    InactiveHabit(i64),
    #[error("Invalid value {value} for habit {habit_id}")]
    InvalidValue { habit_id: i64, value: f64 },
    #[error("Invalid batch file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Scoring failed: {0}")]
    Score(#[from] ScoreError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, EntryError>;

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub submitted: usize,
    /// Recomputed daily scores, ascending by date.
    pub scores: Vec<DailyScore>,
}

#[derive(Debug, Deserialize)]
struct BatchFile {
    entries: Vec<HabitEntry>,
}

fn check_entry<S: ScoreStore>(store: &S, entry: &HabitEntry) -> Result<()> {
    if !entry.value.is_finite() {
        return Err(EntryError::InvalidValue {
            habit_id: entry.habit_id,
            value: entry.value,
        });
    }
    let habit = store
        .habit(entry.habit_id)?
        .ok_or(EntryError::NotFound(entry.habit_id))?;
    if !habit.is_active {
        return Err(EntryError::InactiveHabit(habit.id));
    }
    Ok(())
}

/// Record one value and recompute its date. Resubmitting overwrites.
///
/// Dates after `date` are not recomputed; run a range recompute if their
/// momentum should reflect the change.
pub fn submit_entry(db: &Database, habit_id: i64, date: NaiveDate, value: f64) -> Result<DailyScore> {
    let entry = HabitEntry { habit_id, date, value };
    check_entry(db, &entry)?;

    db.upsert_entry(&entry)?;
    log::debug!("Entry habit={habit_id} date={date} value={value}");

    Ok(compute_score_for_date(db, date)?)
}

/// Record many values at once. All entries are checked before anything is
/// written, then stored together and their dates recomputed oldest first.
pub fn submit_batch(db: &Database, entries: &[HabitEntry]) -> Result<BatchResult> {
    for entry in entries {
        check_entry(db, entry)?;
    }

    db.transaction(|db| -> Result<()> {
        for entry in entries {
            db.upsert_entry(entry)?;
        }
        Ok(())
    })?;

    let dates: BTreeSet<NaiveDate> = entries.iter().map(|e| e.date).collect();
    let scores = dates
        .into_iter()
        .map(|date| compute_score_for_date(db, date))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    log::info!("Stored {} entries across {} dates", entries.len(), scores.len());
    Ok(BatchResult {
        submitted: entries.len(),
        scores,
    })
}

/// Parse a batch file: `{"entries": [{"habit_id": 1, "date": "2024-03-01", "value": 30}]}`.
pub fn parse_batch(json: &str) -> Result<Vec<HabitEntry>> {
    let file: BatchFile = serde_json::from_str(json)?;
    Ok(file.entries)
}
