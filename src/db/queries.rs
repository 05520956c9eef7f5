use super::models::{DailyScore, ExternalReading, Habit, HabitEntry, HabitScore, MomentumParams, NewHabit, Thresholds};
use super::{Database, DbError, Result};
use crate::scoring::store::{ScoreStore, StoreResult};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};

const HABIT_COLUMNS: &str = "id, name, category, weight, target_days_per_week,
    nonzero_threshold, goal_threshold, stretch_threshold, zero_threshold,
    compound_rate, decay_rate, forgiveness_days, is_inverted, is_active, created_at";

fn habit_from_row(row: &Row) -> rusqlite::Result<Habit> {
    Ok(Habit {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        weight: row.get(3)?,
        target_days_per_week: row.get(4)?,
        thresholds: Thresholds {
            nonzero: row.get(5)?,
            goal: row.get(6)?,
            stretch: row.get(7)?,
            zero: row.get(8)?,
        },
        momentum: MomentumParams {
            compound_rate: row.get(9)?,
            decay_rate: row.get(10)?,
            forgiveness_days: row.get(11)?,
        },
        is_inverted: row.get(12)?,
        is_active: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn habit_score_from_row(row: &Row) -> rusqlite::Result<HabitScore> {
    Ok(HabitScore {
        habit_id: row.get(0)?,
        date: row.get(1)?,
        raw_score: row.get(2)?,
        momentum_multiplier: row.get(3)?,
        final_score: row.get(4)?,
        weekly_completion_rate: row.get(5)?,
    })
}

fn daily_score_from_row(row: &Row) -> rusqlite::Result<DailyScore> {
    Ok(DailyScore {
        date: row.get(0)?,
        base_score: row.get(1)?,
        external_modifier: row.get(2)?,
        final_score: row.get(3)?,
        cumulative_score: row.get(4)?,
    })
}

impl Database {
    /// Insert a habit (already validated). Returns the new id.
    pub fn insert_habit(&self, h: &NewHabit) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO habits (
                name, category, weight, target_days_per_week,
                nonzero_threshold, goal_threshold, stretch_threshold, zero_threshold,
                compound_rate, decay_rate, forgiveness_days, is_inverted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                h.name, h.category, h.weight, h.target_days_per_week,
                h.nonzero_threshold, h.goal_threshold, h.stretch_threshold, h.zero_threshold,
                h.compound_rate, h.decay_rate, h.forgiveness_days, h.is_inverted,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrite a habit's configuration. Returns false if no such habit.
    pub fn update_habit_row(&self, id: i64, h: &NewHabit, is_active: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE habits SET
                name = ?2, weight = ?3, target_days_per_week = ?4,
                nonzero_threshold = ?5, goal_threshold = ?6, stretch_threshold = ?7,
                zero_threshold = ?8, compound_rate = ?9, decay_rate = ?10,
                forgiveness_days = ?11, is_inverted = ?12, is_active = ?13
             WHERE id = ?1",
            params![
                id, h.name, h.weight, h.target_days_per_week,
                h.nonzero_threshold, h.goal_threshold, h.stretch_threshold,
                h.zero_threshold, h.compound_rate, h.decay_rate,
                h.forgiveness_days, h.is_inverted, is_active,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Soft-(de)activate a habit. Returns false if no such habit.
    pub fn set_habit_active(&self, id: i64, active: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE habits SET is_active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        Ok(changed > 0)
    }

    /// All habits ordered by id, optionally including deactivated ones.
    pub fn list_habits(&self, include_inactive: bool) -> Result<Vec<Habit>> {
        let sql = if include_inactive {
            format!("SELECT {HABIT_COLUMNS} FROM habits ORDER BY id")
        } else {
            format!("SELECT {HABIT_COLUMNS} FROM habits WHERE is_active = 1 ORDER BY id")
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let habits = stmt
            .query_map([], habit_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    pub fn count_habits(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM habits", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Insert or overwrite the value for (habit, date).
    pub fn upsert_entry(&self, e: &HabitEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO habit_entries (habit_id, date, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(habit_id, date) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            params![e.habit_id, e.date, e.value],
        )?;
        Ok(())
    }

    /// All entries on a date, ordered by habit id.
    pub fn entries_on(&self, date: NaiveDate) -> Result<Vec<HabitEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT habit_id, date, value FROM habit_entries WHERE date = ?1 ORDER BY habit_id",
        )?;
        let entries = stmt
            .query_map(params![date], |row| {
                Ok(HabitEntry {
                    habit_id: row.get(0)?,
                    date: row.get(1)?,
                    value: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Insert or overwrite the external reading for a date, together with the
    /// modifier it produces.
    pub fn upsert_external_reading(&self, r: &ExternalReading, modifier: f64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO external_readings (date, sleep_score, hrv_ms, recovery_score, modifier, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT(date) DO UPDATE SET
                sleep_score = excluded.sleep_score,
                hrv_ms = excluded.hrv_ms,
                recovery_score = excluded.recovery_score,
                modifier = excluded.modifier,
                updated_at = datetime('now')",
            params![r.date, r.sleep, r.hrv, r.recovery, modifier],
        )?;
        Ok(())
    }

    /// Dates with an external reading in `start..=end`, ascending.
    pub fn reading_dates_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT date FROM external_readings WHERE date >= ?1 AND date <= ?2 ORDER BY date",
        )?;
        let dates = stmt
            .query_map(params![start, end], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(dates)
    }

    pub fn latest_reading_date(&self) -> Result<Option<NaiveDate>> {
        let date = self
            .conn
            .query_row("SELECT MAX(date) FROM external_readings", [], |row| row.get(0))?;
        Ok(date)
    }

    /// Daily scores in `start..=end`, ascending by date.
    pub fn daily_scores_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, base_score, external_modifier, final_score, cumulative_score
             FROM daily_scores WHERE date >= ?1 AND date <= ?2 ORDER BY date",
        )?;
        let scores = stmt
            .query_map(params![start, end], daily_score_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    /// Every daily score up to and including `end`, ascending by date.
    pub fn daily_scores_through(&self, end: NaiveDate) -> Result<Vec<DailyScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, base_score, external_modifier, final_score, cumulative_score
             FROM daily_scores WHERE date <= ?1 ORDER BY date",
        )?;
        let scores = stmt
            .query_map(params![end], daily_score_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    /// Habit scores for every habit on one date, ordered by habit id.
    pub fn habit_scores_on(&self, date: NaiveDate) -> Result<Vec<HabitScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT habit_id, date, raw_score, momentum_multiplier, final_score, weekly_completion_rate
             FROM habit_scores WHERE date = ?1 ORDER BY habit_id",
        )?;
        let scores = stmt
            .query_map(params![date], habit_score_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scores)
    }
}

impl ScoreStore for Database {
    fn active_habits(&self) -> StoreResult<Vec<Habit>> {
        self.list_habits(false)
    }

    fn habit(&self, habit_id: i64) -> StoreResult<Option<Habit>> {
        let habit = self
            .conn
            .query_row(
                &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
                params![habit_id],
                habit_from_row,
            )
            .optional()?;
        Ok(habit)
    }

    fn entry_value(&self, habit_id: i64, date: NaiveDate) -> StoreResult<Option<f64>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM habit_entries WHERE habit_id = ?1 AND date = ?2",
                params![habit_id, date],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn entries_between(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<HabitEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT habit_id, date, value FROM habit_entries
             WHERE habit_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let entries = stmt
            .query_map(params![habit_id, start, end], |row| {
                Ok(HabitEntry {
                    habit_id: row.get(0)?,
                    date: row.get(1)?,
                    value: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn habit_score(&self, habit_id: i64, date: NaiveDate) -> StoreResult<Option<HabitScore>> {
        let score = self
            .conn
            .query_row(
                "SELECT habit_id, date, raw_score, momentum_multiplier, final_score, weekly_completion_rate
                 FROM habit_scores WHERE habit_id = ?1 AND date = ?2",
                params![habit_id, date],
                habit_score_from_row,
            )
            .optional()?;
        Ok(score)
    }

    fn habit_scores_between(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<HabitScore>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT habit_id, date, raw_score, momentum_multiplier, final_score, weekly_completion_rate
             FROM habit_scores
             WHERE habit_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let scores = stmt
            .query_map(params![habit_id, start, end], habit_score_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    fn upsert_habit_score(&self, s: &HabitScore) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO habit_scores (
                habit_id, date, raw_score, momentum_multiplier, final_score,
                weekly_completion_rate, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
            ON CONFLICT(habit_id, date) DO UPDATE SET
                raw_score = excluded.raw_score,
                momentum_multiplier = excluded.momentum_multiplier,
                final_score = excluded.final_score,
                weekly_completion_rate = excluded.weekly_completion_rate,
                computed_at = datetime('now')",
            params![
                s.habit_id, s.date, s.raw_score, s.momentum_multiplier,
                s.final_score, s.weekly_completion_rate,
            ],
        )?;
        Ok(())
    }

    fn daily_score(&self, date: NaiveDate) -> StoreResult<Option<DailyScore>> {
        let score = self
            .conn
            .query_row(
                "SELECT date, base_score, external_modifier, final_score, cumulative_score
                 FROM daily_scores WHERE date = ?1",
                params![date],
                daily_score_from_row,
            )
            .optional()?;
        Ok(score)
    }

    fn upsert_daily_score(&self, s: &DailyScore) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO daily_scores (
                date, base_score, external_modifier, final_score, cumulative_score, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            ON CONFLICT(date) DO UPDATE SET
                base_score = excluded.base_score,
                external_modifier = excluded.external_modifier,
                final_score = excluded.final_score,
                cumulative_score = excluded.cumulative_score,
                computed_at = datetime('now')",
            params![s.date, s.base_score, s.external_modifier, s.final_score, s.cumulative_score],
        )?;
        Ok(())
    }

    fn external_reading(&self, date: NaiveDate) -> StoreResult<Option<ExternalReading>> {
        let reading = self
            .conn
            .query_row(
                "SELECT date, sleep_score, hrv_ms, recovery_score
                 FROM external_readings WHERE date = ?1",
                params![date],
                |row| {
                    Ok(ExternalReading {
                        date: row.get(0)?,
                        sleep: row.get(1)?,
                        hrv: row.get(2)?,
                        recovery: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(reading)
    }

    fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&Self) -> std::result::Result<T, E>,
    {
        // IMMEDIATE takes the write lock up front so two writers for the same
        // date cannot interleave their read-modify-write.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let out = f(self)?;
        tx.commit().map_err(DbError::from)?;
        Ok(out)
    }
}
