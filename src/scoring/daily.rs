//! Daily aggregation: per-habit scores, the weighted day score, and the
//! running cumulative total.

use chrono::NaiveDate;

use super::store::{ScoreStore, StoreResult};
use super::{external, momentum, raw, weekly, Result};
use crate::db::models::{DailyScore, Habit, HabitScore};

/// Outcome of a best-effort range recomputation.
#[derive(Debug, Default)]
pub struct RecomputeResult {
    /// Dates that were recomputed and committed, ascending.
    pub recomputed: Vec<NaiveDate>,
    /// Dates that failed, with the error message.
    pub failed: Vec<(NaiveDate, String)>,
}

/// Score one habit for one date. Reads the previous day's multiplier from the
/// store, so that day must already be final.
pub fn compute_habit_score<S: ScoreStore>(store: &S, habit: &Habit, date: NaiveDate) -> StoreResult<HabitScore> {
    // No entry is no effort, whichever direction the habit runs.
    let raw_score = match store.entry_value(habit.id, date)? {
        Some(value) => raw::raw_score(habit, value),
        None => 0.0,
    };

    let completed = weekly::completed_days(store, habit.id, date)?;
    let completion_rate = weekly::rate(completed);
    let tier = weekly::classify(
        completed,
        habit.target_days_per_week,
        habit.momentum.forgiveness_days,
    );
    let previous = momentum::previous_multiplier(store, habit.id, date)?;
    let multiplier = momentum::next_multiplier(previous, tier, &habit.momentum);

    log::debug!(
        "{} {}: raw={:.1} week={:.2} ({}) momentum {:.3} -> {:.3}",
        date, habit.name, raw_score, completion_rate, tier, previous, multiplier
    );

    Ok(HabitScore {
        habit_id: habit.id,
        date,
        raw_score,
        momentum_multiplier: multiplier,
        final_score: raw_score * multiplier,
        weekly_completion_rate: completion_rate,
    })
}

/// Weighted average of `(final_score, weight)` pairs.
/// A non-positive or non-finite weight sum yields 0.0.
pub fn weighted_base_score(parts: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = parts.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 || !total_weight.is_finite() {
        if !parts.is_empty() {
            log::warn!("Total habit weight is {total_weight}; base score falls back to 0.0");
        }
        return 0.0;
    }

    let weighted: f64 = parts.iter().map(|(s, w)| s * w).sum();
    let base = weighted / total_weight;
    if base.is_finite() {
        base
    } else {
        log::warn!("Non-finite base score ({base}); falling back to 0.0");
        0.0
    }
}

/// Recompute and store every active habit's score and the daily score for
/// `date`, as one transaction. Safe to re-run: unchanged inputs give the same
/// stored records.
///
/// Later dates are not touched. Their momentum was derived from the old value
/// of this date and stays stale until they are recomputed too.
pub fn compute_score_for_date<S: ScoreStore>(store: &S, date: NaiveDate) -> Result<DailyScore> {
    store.transaction(|store| -> Result<DailyScore> {
        let habits = store.active_habits()?;

        let mut parts = Vec::with_capacity(habits.len());
        for habit in &habits {
            let score = compute_habit_score(store, habit, date)?;
            store.upsert_habit_score(&score)?;
            parts.push((score.final_score, habit.weight));
        }

        let base_score = weighted_base_score(&parts);
        let external_modifier = external::external_modifier(store.external_reading(date)?.as_ref());
        let final_score = base_score * external_modifier;

        let previous_cumulative = match date.pred_opt() {
            Some(previous) => store.daily_score(previous)?.map_or(0.0, |d| d.cumulative_score),
            None => 0.0,
        };

        let daily = DailyScore {
            date,
            base_score,
            external_modifier,
            final_score,
            cumulative_score: previous_cumulative + final_score,
        };
        store.upsert_daily_score(&daily)?;

        log::info!(
            "{}: {} habits, base {:.3} x {:.2} = {:.3} (cumulative {:.2})",
            date,
            habits.len(),
            base_score,
            external_modifier,
            final_score,
            daily.cumulative_score
        );
        Ok(daily)
    })
}

/// Number of dates in `start..=end` (0 if the range is inverted).
pub fn day_count(start: NaiveDate, end: NaiveDate) -> u64 {
    ((end - start).num_days() + 1).max(0) as u64
}

/// Recompute `start..=end` in ascending order. See [`recompute_range_with`].
pub fn recompute_range<S: ScoreStore>(store: &S, start: NaiveDate, end: NaiveDate) -> RecomputeResult {
    recompute_range_with(store, start, end, |_, _| {})
}

/// Recompute `start..=end` strictly in ascending order, committing each date
/// before moving on so the next date sees its momentum.
///
/// Best-effort: a failing date is logged and skipped, the rest still run.
/// `on_date` is called after each date with whether it succeeded.
pub fn recompute_range_with<S, F>(
    store: &S,
    start: NaiveDate,
    end: NaiveDate,
    mut on_date: F,
) -> RecomputeResult
where
    S: ScoreStore,
    F: FnMut(NaiveDate, bool),
{
    let mut result = RecomputeResult::default();

    for date in start.iter_days().take_while(|d| *d <= end) {
        match compute_score_for_date(store, date) {
            Ok(_) => {
                result.recomputed.push(date);
                on_date(date, true);
            }
            Err(e) => {
                log::warn!("Failed to recompute scores for {date}: {e}");
                result.failed.push((date, e.to_string()));
                on_date(date, false);
            }
        }
    }

    log::info!(
        "Recomputed {} of {} dates ({} failed)",
        result.recomputed.len(),
        day_count(start, end),
        result.failed.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ExternalReading, HabitEntry, NewHabit};
    use chrono::Duration;
    use crate::db::{Database, DbError};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// goal 30, stretch 60, 5 days/week, 2 forgiveness days, 1.15 / 0.9.
    fn reading(db: &Database) -> i64 {
        db.insert_habit(&NewHabit::new("Reading", 30.0, 60.0)).unwrap()
    }

    fn log_days(db: &Database, habit_id: i64, first: NaiveDate, days: i64, value: f64) {
        for offset in 0..days {
            db.upsert_entry(&HabitEntry {
                habit_id,
                date: first + Duration::days(offset),
                value,
            })
            .unwrap();
        }
    }

    #[test]
    fn test_first_day_meeting_target_keeps_neutral_momentum() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        // five logged days in the window, but no scores computed before today
        log_days(&db, id, day - Duration::days(4), 5, 45.0);

        let daily = compute_score_for_date(&db, day).unwrap();
        let hs = db.habit_score(id, day).unwrap().unwrap();

        assert_eq!(hs.raw_score, 1.0);
        assert_eq!(hs.weekly_completion_rate, 5.0 / 7.0);
        assert_eq!(hs.momentum_multiplier, 1.0);
        assert_eq!(hs.final_score, 1.0);

        assert_eq!(daily.base_score, 1.0);
        assert_eq!(daily.external_modifier, 1.0);
        assert_eq!(daily.final_score, 1.0);
        assert_eq!(daily.cumulative_score, 1.0);
    }

    #[test]
    fn test_six_of_seven_exceeds_and_compounds() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        log_days(&db, id, day - Duration::days(4), 6, 45.0);

        compute_score_for_date(&db, day).unwrap();
        let next = compute_score_for_date(&db, day + Duration::days(1)).unwrap();
        let hs = db.habit_score(id, day + Duration::days(1)).unwrap().unwrap();

        assert_eq!(hs.weekly_completion_rate, 6.0 / 7.0);
        assert!(approx(hs.momentum_multiplier, 1.15));
        assert!(approx(next.final_score, 1.15));
        assert!(approx(next.cumulative_score, 2.15));
    }

    #[test]
    fn test_empty_week_fails_and_decays() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        db.upsert_habit_score(&HabitScore {
            habit_id: id,
            date: day - Duration::days(1),
            raw_score: 0.0,
            momentum_multiplier: 1.0,
            final_score: 0.0,
            weekly_completion_rate: 0.0,
        })
        .unwrap();

        compute_score_for_date(&db, day).unwrap();
        let hs = db.habit_score(id, day).unwrap().unwrap();
        assert_eq!(hs.raw_score, 0.0);
        assert!(approx(hs.momentum_multiplier, 0.729));
    }

    #[test]
    fn test_three_of_five_with_two_forgiveness_is_close() {
        // 3 of 7 days against a 5-day target sits exactly on the close boundary
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        log_days(&db, id, day - Duration::days(2), 3, 45.0);

        compute_score_for_date(&db, day).unwrap();
        let hs = db.habit_score(id, day).unwrap().unwrap();
        assert!(approx(hs.momentum_multiplier, 0.9));
    }

    #[test]
    fn test_cumulative_adds_previous_day() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        log_days(&db, id, day - Duration::days(4), 5, 45.0);
        db.upsert_daily_score(&DailyScore {
            date: day - Duration::days(1),
            base_score: 0.5,
            external_modifier: 1.0,
            final_score: 0.5,
            cumulative_score: 12.5,
        })
        .unwrap();

        let daily = compute_score_for_date(&db, day).unwrap();
        assert_eq!(daily.final_score, 1.0);
        assert_eq!(daily.cumulative_score, 13.5);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        log_days(&db, id, day - Duration::days(6), 7, 70.0);
        compute_score_for_date(&db, day - Duration::days(1)).unwrap();

        let first = compute_score_for_date(&db, day).unwrap();
        let first_hs = db.habit_score(id, day).unwrap();
        let second = compute_score_for_date(&db, day).unwrap();
        let second_hs = db.habit_score(id, day).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_hs, second_hs);
        assert_eq!(db.daily_score(day).unwrap(), Some(second));
    }

    #[test]
    fn test_out_of_order_recompute_leaves_later_date_stale() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        let next = day + Duration::days(1);
        log_days(&db, id, day - Duration::days(6), 8, 45.0);

        compute_score_for_date(&db, next).unwrap();
        compute_score_for_date(&db, day).unwrap();
        let stale = db.habit_score(id, next).unwrap().unwrap();
        assert!(approx(stale.momentum_multiplier, 1.15));

        compute_score_for_date(&db, next).unwrap();
        let fixed = db.habit_score(id, next).unwrap().unwrap();
        assert!(approx(fixed.momentum_multiplier, 1.15 * 1.15));
    }

    #[test]
    fn test_gap_resets_momentum() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        db.upsert_habit_score(&HabitScore {
            habit_id: id,
            date: day - Duration::days(2),
            raw_score: 1.5,
            momentum_multiplier: 2.5,
            final_score: 3.75,
            weekly_completion_rate: 1.0,
        })
        .unwrap();
        log_days(&db, id, day - Duration::days(4), 5, 45.0);

        compute_score_for_date(&db, day).unwrap();
        let hs = db.habit_score(id, day).unwrap().unwrap();
        assert_eq!(hs.momentum_multiplier, 1.0);
    }

    #[test]
    fn test_weighted_average_and_inactive_habits() {
        let db = Database::open_in_memory().unwrap();
        let day = d("2024-03-10");
        let heavy = db
            .insert_habit(&NewHabit { weight: 3.0, ..NewHabit::new("Exercise", 20.0, 45.0) })
            .unwrap();
        let light = reading(&db);
        let retired = db.insert_habit(&NewHabit::new("Piano", 15.0, 30.0)).unwrap();
        db.set_habit_active(retired, false).unwrap();

        // heavy meets its week exactly and goes stretch today; light does nothing
        log_days(&db, heavy, day - Duration::days(4), 5, 60.0);
        log_days(&db, retired, day, 1, 30.0);

        let daily = compute_score_for_date(&db, day).unwrap();
        // (1.5 * 1.0 * 3 + 0.0 * 1) / 4
        assert!(approx(daily.base_score, 1.125));
        assert!(db.habit_score(light, day).unwrap().is_some());
        assert!(db.habit_score(retired, day).unwrap().is_none());
    }

    #[test]
    fn test_no_active_habits_scores_zero() {
        let db = Database::open_in_memory().unwrap();
        let daily = compute_score_for_date(&db, d("2024-03-10")).unwrap();
        assert_eq!(daily.base_score, 0.0);
        assert_eq!(daily.final_score, 0.0);
        assert_eq!(daily.cumulative_score, 0.0);
    }

    #[test]
    fn test_weight_sum_not_positive_scores_zero() {
        assert_eq!(weighted_base_score(&[]), 0.0);
        assert_eq!(weighted_base_score(&[(1.5, 0.0), (1.0, 0.0)]), 0.0);
        assert_eq!(weighted_base_score(&[(1.5, 1.0), (1.0, -2.0)]), 0.0);
        assert_eq!(weighted_base_score(&[(1.5, f64::NAN)]), 0.0);
    }

    #[test]
    fn test_inverted_habit_without_entry_scores_zero() {
        let db = Database::open_in_memory().unwrap();
        let day = d("2024-03-10");
        let id = db
            .insert_habit(&NewHabit {
                nonzero_threshold: 120.0,
                is_inverted: true,
                ..NewHabit::new("Screen time", 45.0, 15.0)
            })
            .unwrap();

        compute_score_for_date(&db, day).unwrap();
        assert_eq!(db.habit_score(id, day).unwrap().unwrap().raw_score, 0.0);

        db.upsert_entry(&HabitEntry { habit_id: id, date: day, value: 0.0 }).unwrap();
        compute_score_for_date(&db, day).unwrap();
        assert_eq!(db.habit_score(id, day).unwrap().unwrap().raw_score, 1.5);
    }

    #[test]
    fn test_external_modifier_applies_to_final() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let day = d("2024-03-10");
        log_days(&db, id, day - Duration::days(4), 5, 45.0);
        let r = ExternalReading { date: day, sleep: Some(84.0), hrv: None, recovery: None };
        db.upsert_external_reading(&r, 1.2).unwrap();

        let daily = compute_score_for_date(&db, day).unwrap();
        assert_eq!(daily.base_score, 1.0);
        assert!(approx(daily.external_modifier, 1.2));
        assert!(approx(daily.final_score, 1.2));
    }

    #[test]
    fn test_earliest_date_has_no_previous_day() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        db.upsert_entry(&HabitEntry { habit_id: id, date: NaiveDate::MIN, value: 45.0 }).unwrap();

        let daily = compute_score_for_date(&db, NaiveDate::MIN).unwrap();
        assert!(daily.final_score > 0.0);
        assert!(approx(daily.cumulative_score, daily.final_score));
    }

    #[test]
    fn test_range_runs_ascending_and_chains_momentum() {
        let db = Database::open_in_memory().unwrap();
        let id = reading(&db);
        let start = d("2024-03-01");
        let end = d("2024-03-10");
        log_days(&db, id, start, 10, 45.0);

        let result = recompute_range(&db, start, end);
        assert!(result.failed.is_empty());
        assert_eq!(result.recomputed.len(), 10);
        assert!(result.recomputed.windows(2).all(|w| w[0] < w[1]));

        let p = crate::db::models::MomentumParams::default();
        let tiers = (0..10).map(|i| {
            let completed = (i + 1).min(7);
            weekly::classify(completed, 5, 2)
        });
        let expected = momentum::fold_momentum(1.0, tiers, &p);
        let last = db.habit_score(id, end).unwrap().unwrap();
        assert!(approx(last.momentum_multiplier, expected));

        let cumulative: f64 = db
            .daily_scores_between(start, end)
            .unwrap()
            .iter()
            .map(|s| s.final_score)
            .sum();
        assert!(approx(db.daily_score(end).unwrap().unwrap().cumulative_score, cumulative));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let db = Database::open_in_memory().unwrap();
        let result = recompute_range(&db, d("2024-03-10"), d("2024-03-01"));
        assert!(result.recomputed.is_empty());
        assert!(result.failed.is_empty());
        assert_eq!(day_count(d("2024-03-10"), d("2024-03-01")), 0);
        assert_eq!(day_count(d("2024-03-01"), d("2024-03-01")), 1);
    }

    /// Delegates to a real database but fails every read of one date's
    /// external reading.
    struct FlakyStore {
        inner: Database,
        broken: NaiveDate,
    }

    impl ScoreStore for FlakyStore {
        fn active_habits(&self) -> StoreResult<Vec<Habit>> {
            self.inner.active_habits()
        }
        fn habit(&self, habit_id: i64) -> StoreResult<Option<Habit>> {
            self.inner.habit(habit_id)
        }
        fn entry_value(&self, habit_id: i64, date: NaiveDate) -> StoreResult<Option<f64>> {
            self.inner.entry_value(habit_id, date)
        }
        fn entries_between(&self, habit_id: i64, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<HabitEntry>> {
            self.inner.entries_between(habit_id, start, end)
        }
        fn habit_score(&self, habit_id: i64, date: NaiveDate) -> StoreResult<Option<HabitScore>> {
            self.inner.habit_score(habit_id, date)
        }
        fn habit_scores_between(&self, habit_id: i64, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<HabitScore>> {
            self.inner.habit_scores_between(habit_id, start, end)
        }
        fn upsert_habit_score(&self, score: &HabitScore) -> StoreResult<()> {
            self.inner.upsert_habit_score(score)
        }
        fn daily_score(&self, date: NaiveDate) -> StoreResult<Option<DailyScore>> {
            self.inner.daily_score(date)
        }
        fn upsert_daily_score(&self, score: &DailyScore) -> StoreResult<()> {
            self.inner.upsert_daily_score(score)
        }
        fn external_reading(&self, date: NaiveDate) -> StoreResult<Option<ExternalReading>> {
            if date == self.broken {
                return Err(DbError::Migration("reading table unavailable".into()));
            }
            self.inner.external_reading(date)
        }
        fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
        where
            E: From<DbError>,
            F: FnOnce(&Self) -> std::result::Result<T, E>,
        {
            self.inner.transaction(|_| f(self))
        }
    }

    #[test]
    fn test_range_skips_failed_dates() {
        let inner = Database::open_in_memory().unwrap();
        let id = reading(&inner);
        let start = d("2024-03-01");
        log_days(&inner, id, start, 5, 45.0);
        let store = FlakyStore { inner, broken: d("2024-03-03") };

        let mut seen = Vec::new();
        let result = recompute_range_with(&store, start, d("2024-03-05"), |date, ok| seen.push((date, ok)));

        assert_eq!(
            result.recomputed,
            vec![d("2024-03-01"), d("2024-03-02"), d("2024-03-04"), d("2024-03-05")]
        );
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, d("2024-03-03"));
        assert_eq!(seen.len(), 5);
        assert!(!seen[2].1);

        // the failed date rolled back: no partial habit score was left behind
        assert!(store.inner.habit_score(id, d("2024-03-03")).unwrap().is_none());
        assert!(store.inner.daily_score(d("2024-03-03")).unwrap().is_none());
        // and the next date restarted momentum from neutral
        let after = store.inner.habit_score(id, d("2024-03-04")).unwrap().unwrap();
        let p = crate::db::models::MomentumParams::default();
        assert!(approx(after.momentum_multiplier, momentum::next_multiplier(1.0, weekly::classify(4, 5, 2), &p)));
    }
}
