use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Value boundaries for one habit.
///
/// For normal habits `nonzero <= goal <= stretch`. For inverted habits the
/// order flips: `stretch` is the lowest (best) value and `nonzero` is the
/// "too much" ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub nonzero: f64,
    pub goal: f64,
    pub stretch: f64,
    /// Only meaningful for inverted habits; stored for display, not scored.
    pub zero: Option<f64>,
}

/// Per-habit tuning for the momentum multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumParams {
    pub compound_rate: f64,
    pub decay_rate: f64,
    pub forgiveness_days: u32,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            compound_rate: DEFAULT_COMPOUND_RATE,
            decay_rate: DEFAULT_DECAY_RATE,
            forgiveness_days: DEFAULT_FORGIVENESS_DAYS,
        }
    }
}

pub const DEFAULT_COMPOUND_RATE: f64 = 1.15;
pub const DEFAULT_DECAY_RATE: f64 = 0.9;
pub const DEFAULT_FORGIVENESS_DAYS: u32 = 2;
pub const DEFAULT_TARGET_DAYS: u32 = 5;
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A habit row read from the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Habit {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub weight: f64,
    pub target_days_per_week: u32,
    pub thresholds: Thresholds,
    pub momentum: MomentumParams,
    pub is_inverted: bool,
    pub is_active: bool,
    pub created_at: String,
}

/// Data for creating a habit. Field names follow the habits.json format so
/// the same struct deserializes from import files and `[[habits]]` in config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewHabit {
    pub name: String,
    #[serde(default = "default_category", alias = "habit_type")]
    pub category: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_target_days")]
    pub target_days_per_week: u32,
    #[serde(default)]
    pub nonzero_threshold: f64,
    pub goal_threshold: f64,
    pub stretch_threshold: f64,
    #[serde(default)]
    pub zero_threshold: Option<f64>,
    #[serde(default = "default_compound_rate")]
    pub compound_rate: f64,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_forgiveness_days")]
    pub forgiveness_days: u32,
    #[serde(default)]
    pub is_inverted: bool,
}

fn default_category() -> String {
    "binary".to_string()
}
fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}
fn default_target_days() -> u32 {
    DEFAULT_TARGET_DAYS
}
fn default_compound_rate() -> f64 {
    DEFAULT_COMPOUND_RATE
}
fn default_decay_rate() -> f64 {
    DEFAULT_DECAY_RATE
}
fn default_forgiveness_days() -> u32 {
    DEFAULT_FORGIVENESS_DAYS
}

impl NewHabit {
    /// Minimal definition with every tunable at its default.
    pub fn new(name: &str, goal: f64, stretch: f64) -> Self {
        Self {
            name: name.to_string(),
            category: default_category(),
            weight: DEFAULT_WEIGHT,
            target_days_per_week: DEFAULT_TARGET_DAYS,
            nonzero_threshold: 0.0,
            goal_threshold: goal,
            stretch_threshold: stretch,
            zero_threshold: None,
            compound_rate: DEFAULT_COMPOUND_RATE,
            decay_rate: DEFAULT_DECAY_RATE,
            forgiveness_days: DEFAULT_FORGIVENESS_DAYS,
            is_inverted: false,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            nonzero: self.nonzero_threshold,
            goal: self.goal_threshold,
            stretch: self.stretch_threshold,
            zero: self.zero_threshold,
        }
    }

    pub fn momentum(&self) -> MomentumParams {
        MomentumParams {
            compound_rate: self.compound_rate,
            decay_rate: self.decay_rate,
            forgiveness_days: self.forgiveness_days,
        }
    }
}

/// Partial update of a habit's configuration. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HabitUpdate {
    pub name: Option<String>,
    pub weight: Option<f64>,
    pub target_days_per_week: Option<u32>,
    pub nonzero_threshold: Option<f64>,
    pub goal_threshold: Option<f64>,
    pub stretch_threshold: Option<f64>,
    pub zero_threshold: Option<f64>,
    pub compound_rate: Option<f64>,
    pub decay_rate: Option<f64>,
    pub forgiveness_days: Option<u32>,
    pub is_inverted: Option<bool>,
    pub is_active: Option<bool>,
}

impl HabitUpdate {
    /// Apply the update on top of an existing habit, producing the definition
    /// to validate and store.
    pub fn apply(&self, habit: &Habit) -> NewHabit {
        NewHabit {
            name: self.name.clone().unwrap_or_else(|| habit.name.clone()),
            category: habit.category.clone(),
            weight: self.weight.unwrap_or(habit.weight),
            target_days_per_week: self
                .target_days_per_week
                .unwrap_or(habit.target_days_per_week),
            nonzero_threshold: self.nonzero_threshold.unwrap_or(habit.thresholds.nonzero),
            goal_threshold: self.goal_threshold.unwrap_or(habit.thresholds.goal),
            stretch_threshold: self.stretch_threshold.unwrap_or(habit.thresholds.stretch),
            zero_threshold: self.zero_threshold.or(habit.thresholds.zero),
            compound_rate: self.compound_rate.unwrap_or(habit.momentum.compound_rate),
            decay_rate: self.decay_rate.unwrap_or(habit.momentum.decay_rate),
            forgiveness_days: self
                .forgiveness_days
                .unwrap_or(habit.momentum.forgiveness_days),
            is_inverted: self.is_inverted.unwrap_or(habit.is_inverted),
        }
    }
}

/// One submitted value for a habit on a date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HabitEntry {
    pub habit_id: i64,
    pub date: NaiveDate,
    pub value: f64,
}

/// Per-habit score for one date. Written only by the daily aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HabitScore {
    pub habit_id: i64,
    pub date: NaiveDate,
    pub raw_score: f64,
    pub momentum_multiplier: f64,
    pub final_score: f64,
    pub weekly_completion_rate: f64,
}

/// Aggregated score for one date. Written only by the daily aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyScore {
    pub date: NaiveDate,
    pub base_score: f64,
    pub external_modifier: f64,
    pub final_score: f64,
    pub cumulative_score: f64,
}

/// Recovery-style readings for one date. Any subset may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExternalReading {
    pub date: NaiveDate,
    /// Sleep performance, 0-100.
    pub sleep: Option<f64>,
    /// Heart-rate variability (RMSSD) in milliseconds.
    pub hrv: Option<f64>,
    /// Recovery, 0-100.
    pub recovery: Option<f64>,
}
