//! Habit administration: validated create/update, soft deactivation and
//! bulk import. Threshold problems are caught here, never at scoring time.

use serde::Deserialize;
use thiserror::Error;

use crate::db::models::{Habit, HabitUpdate, NewHabit};
use crate::db::{Database, DbError};
use crate::scoring::store::ScoreStore;

#[derive(Error, Debug)]
pub enum HabitError {
    #[error("Invalid habit '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },
    #[error("Habit {0} not found")]
    NotFound(i64),
    #[error("Invalid habit file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, HabitError>;

/// Import file layout: `{"habits": [ ... ]}`.
#[derive(Debug, Deserialize)]
struct HabitFile {
    habits: Vec<NewHabit>,
}

fn invalid(h: &NewHabit, reason: impl Into<String>) -> HabitError {
    HabitError::InvalidConfig {
        name: h.name.clone(),
        reason: reason.into(),
    }
}

/// Reject definitions the scoring pipeline cannot interpret sensibly.
pub fn validate(h: &NewHabit) -> Result<()> {
    if h.name.trim().is_empty() {
        return Err(invalid(h, "name is empty"));
    }
    if !h.weight.is_finite() || h.weight < 0.0 {
        return Err(invalid(h, format!("weight must be >= 0, got {}", h.weight)));
    }
    if h.target_days_per_week > 7 {
        return Err(invalid(
            h,
            format!("target_days_per_week must be 0..=7, got {}", h.target_days_per_week),
        ));
    }
    if !(h.compound_rate.is_finite() && h.compound_rate > 1.0) {
        return Err(invalid(h, format!("compound_rate must be > 1, got {}", h.compound_rate)));
    }
    if !(h.decay_rate > 0.0 && h.decay_rate < 1.0) {
        return Err(invalid(h, format!("decay_rate must be in (0, 1), got {}", h.decay_rate)));
    }

    let t = h.thresholds();
    let all = [Some(t.nonzero), Some(t.goal), Some(t.stretch), t.zero];
    if all.iter().flatten().any(|v| !v.is_finite()) {
        return Err(invalid(h, "thresholds must be finite"));
    }

    if h.is_inverted {
        if !(t.stretch <= t.goal && t.goal <= t.nonzero) {
            return Err(invalid(
                h,
                format!(
                    "inverted thresholds need stretch <= goal <= nonzero, got {} / {} / {}",
                    t.stretch, t.goal, t.nonzero
                ),
            ));
        }
        if t.zero.is_some_and(|z| z < t.nonzero) {
            return Err(invalid(h, "zero threshold must be >= nonzero for inverted habits"));
        }
    } else {
        if !(t.nonzero <= t.goal && t.goal <= t.stretch) {
            return Err(invalid(
                h,
                format!(
                    "thresholds need nonzero <= goal <= stretch, got {} / {} / {}",
                    t.nonzero, t.goal, t.stretch
                ),
            ));
        }
        if t.zero.is_some_and(|z| z > t.nonzero) {
            return Err(invalid(h, "zero threshold must be <= nonzero"));
        }
    }
    Ok(())
}

pub fn create_habit(db: &Database, h: &NewHabit) -> Result<Habit> {
    validate(h)?;
    let id = db.insert_habit(h)?;
    log::info!("Created habit {} ({})", id, h.name);
    db.habit(id)?.ok_or(HabitError::NotFound(id))
}

/// Apply a partial update. The merged definition is validated as a whole.
pub fn update_habit(db: &Database, id: i64, update: &HabitUpdate) -> Result<Habit> {
    let current = db.habit(id)?.ok_or(HabitError::NotFound(id))?;
    let merged = update.apply(&current);
    validate(&merged)?;

    let is_active = update.is_active.unwrap_or(current.is_active);
    db.update_habit_row(id, &merged, is_active)?;
    log::info!("Updated habit {} ({})", id, merged.name);
    db.habit(id)?.ok_or(HabitError::NotFound(id))
}

/// Soft delete: the habit leaves future aggregation, its history stays.
pub fn deactivate_habit(db: &Database, id: i64) -> Result<()> {
    if !db.set_habit_active(id, false)? {
        return Err(HabitError::NotFound(id));
    }
    log::info!("Deactivated habit {id}");
    Ok(())
}

/// Import habits from a JSON document. Every definition is validated before
/// anything is written; the inserts share one transaction.
pub fn import_habits(db: &Database, json: &str) -> Result<Vec<Habit>> {
    let file: HabitFile = serde_json::from_str(json)?;
    for h in &file.habits {
        validate(h)?;
    }

    let ids = db.transaction(|db| -> Result<Vec<i64>> {
        file.habits
            .iter()
            .map(|h| db.insert_habit(h).map_err(HabitError::from))
            .collect()
    })?;
    log::info!("Imported {} habits", ids.len());

    ids.into_iter()
        .map(|id| -> Result<Habit> { db.habit(id)?.ok_or(HabitError::NotFound(id)) })
        .collect()
}

/// Insert the configured default habits into an empty database.
/// Invalid definitions are skipped with a warning. Returns how many were added.
pub fn seed_defaults(db: &Database, defaults: &[NewHabit]) -> Result<usize> {
    if defaults.is_empty() {
        return Ok(0);
    }
    if db.count_habits()? > 0 {
        log::debug!("Habits already exist, skipping default load");
        return Ok(0);
    }

    let mut added = 0;
    for h in defaults {
        match create_habit(db, h) {
            Ok(_) => added += 1,
            Err(HabitError::InvalidConfig { name, reason }) => {
                log::warn!("Skipping default habit '{name}': {reason}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen_time() -> NewHabit {
        NewHabit {
            nonzero_threshold: 120.0,
            zero_threshold: Some(180.0),
            is_inverted: true,
            ..NewHabit::new("Screen Time (Post 9PM)", 45.0, 15.0)
        }
    }

    #[test]
    fn test_valid_definitions() {
        assert!(validate(&NewHabit::new("Reading", 30.0, 60.0)).is_ok());
        assert!(validate(&screen_time()).is_ok());
        // equal goal and stretch is allowed
        assert!(validate(&NewHabit::new("Meditate", 1.0, 1.0)).is_ok());
    }

    #[test]
    fn test_rejects_misordered_thresholds() {
        let h = NewHabit::new("Reading", 60.0, 30.0);
        assert!(matches!(validate(&h), Err(HabitError::InvalidConfig { .. })));

        let h = NewHabit { is_inverted: true, ..NewHabit::new("Screen", 15.0, 45.0) };
        assert!(matches!(validate(&h), Err(HabitError::InvalidConfig { .. })));

        let h = NewHabit { zero_threshold: Some(60.0), ..screen_time() };
        assert!(validate(&h).is_err());
    }

    #[test]
    fn test_rejects_bad_rates_and_targets() {
        let base = NewHabit::new("Reading", 30.0, 60.0);
        assert!(validate(&NewHabit { compound_rate: 1.0, ..base.clone() }).is_err());
        assert!(validate(&NewHabit { decay_rate: 1.0, ..base.clone() }).is_err());
        assert!(validate(&NewHabit { decay_rate: 0.0, ..base.clone() }).is_err());
        assert!(validate(&NewHabit { target_days_per_week: 8, ..base.clone() }).is_err());
        assert!(validate(&NewHabit { weight: -1.0, ..base.clone() }).is_err());
        assert!(validate(&NewHabit { goal_threshold: f64::NAN, ..base.clone() }).is_err());
        assert!(validate(&NewHabit { name: "  ".into(), ..base }).is_err());
    }

    #[test]
    fn test_create_update_deactivate() {
        let db = Database::open_in_memory().unwrap();
        let habit = create_habit(&db, &NewHabit::new("Reading", 30.0, 60.0)).unwrap();

        let update = HabitUpdate { goal_threshold: Some(40.0), weight: Some(2.0), ..Default::default() };
        let updated = update_habit(&db, habit.id, &update).unwrap();
        assert_eq!(updated.thresholds.goal, 40.0);
        assert_eq!(updated.weight, 2.0);
        assert_eq!(updated.thresholds.stretch, 60.0);

        // an update that breaks ordering is refused and nothing changes
        let bad = HabitUpdate { goal_threshold: Some(90.0), ..Default::default() };
        assert!(update_habit(&db, habit.id, &bad).is_err());
        assert_eq!(db.habit(habit.id).unwrap().unwrap().thresholds.goal, 40.0);

        deactivate_habit(&db, habit.id).unwrap();
        assert!(!db.habit(habit.id).unwrap().unwrap().is_active);
        assert!(matches!(deactivate_habit(&db, 999), Err(HabitError::NotFound(999))));
    }

    #[test]
    fn test_import_json() {
        let db = Database::open_in_memory().unwrap();
        let json = r#"{
            "habits": [
                {"name": "Reading", "habit_type": "pages", "goal_threshold": 20, "stretch_threshold": 50},
                {"name": "Screen Time (Post 9PM)", "habit_type": "duration",
                 "nonzero_threshold": 120, "goal_threshold": 45, "stretch_threshold": 15,
                 "zero_threshold": 180, "is_inverted": true, "weight": 0.5}
            ]
        }"#;

        let habits = import_habits(&db, json).unwrap();
        assert_eq!(habits.len(), 2);
        assert_eq!(habits[0].category, "pages");
        assert_eq!(habits[0].target_days_per_week, 5);
        assert!(habits[1].is_inverted);
        assert_eq!(habits[1].thresholds.zero, Some(180.0));
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let db = Database::open_in_memory().unwrap();
        let json = r#"{"habits": [
            {"name": "Reading", "goal_threshold": 20, "stretch_threshold": 50},
            {"name": "Broken", "goal_threshold": 50, "stretch_threshold": 20}
        ]}"#;
        assert!(import_habits(&db, json).is_err());
        assert_eq!(db.count_habits().unwrap(), 0);

        assert!(matches!(import_habits(&db, "not json"), Err(HabitError::Parse(_))));
    }

    #[test]
    fn test_seed_only_into_empty_database() {
        let db = Database::open_in_memory().unwrap();
        let defaults = vec![
            NewHabit::new("Reading", 30.0, 60.0),
            NewHabit::new("Broken", 60.0, 30.0),
        ];
        assert_eq!(seed_defaults(&db, &defaults).unwrap(), 1);
        assert_eq!(seed_defaults(&db, &defaults).unwrap(), 0);
        assert_eq!(db.count_habits().unwrap(), 1);
    }
}
