//! Maps one day's value for a habit to a discrete performance tier.

use serde::Serialize;

use crate::db::models::{Habit, Thresholds};

/// Performance tier for a single day's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RawTier {
    None,
    NonZero,
    Goal,
    Stretch,
}

impl RawTier {
    pub fn score(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::NonZero => 0.3,
            Self::Goal => 1.0,
            Self::Stretch => 1.5,
        }
    }
}

/// Classify a value against a habit's thresholds.
///
/// Boundaries are inclusive toward the better tier. Inverted habits treat
/// `nonzero` as the "too much" ceiling: anything at or above it scores nothing.
pub fn tier(thresholds: &Thresholds, is_inverted: bool, value: f64) -> RawTier {
    if is_inverted {
        if value >= thresholds.nonzero {
            RawTier::None
        } else if value <= thresholds.stretch {
            RawTier::Stretch
        } else if value <= thresholds.goal {
            RawTier::Goal
        } else {
            RawTier::NonZero
        }
    } else if value == 0.0 {
        RawTier::None
    } else if value >= thresholds.stretch {
        RawTier::Stretch
    } else if value >= thresholds.goal {
        RawTier::Goal
    } else if value >= thresholds.nonzero {
        RawTier::NonZero
    } else {
        RawTier::None
    }
}

/// Raw score (0.0 / 0.3 / 1.0 / 1.5) for a habit's value on one day.
pub fn raw_score(habit: &Habit, value: f64) -> f64 {
    tier(&habit.thresholds, habit.is_inverted, value).score()
}
