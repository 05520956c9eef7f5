//! Read-only momentum view over stored habit scores.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::HabitScore;
use crate::scoring::momentum::NEUTRAL;
use crate::scoring::store::ScoreStore;
use crate::scoring::{window_start, Result, ScoreError};

/// Days of history loaded per report, inclusive of the report date.
pub const HISTORY_DAYS: u64 = 14;
/// Most recent available scores used for the trend.
pub const TREND_WINDOW: usize = 7;

const GROWING_RATIO: f64 = 1.05;
const DECAYING_RATIO: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumStatus {
    NoData,
    Excellent,
    Good,
    Stable,
    Declining,
    Poor,
}

impl MomentumStatus {
    pub fn from_multiplier(m: f64) -> Self {
        if m >= 1.5 {
            Self::Excellent
        } else if m >= 1.2 {
            Self::Good
        } else if m >= 0.9 {
            Self::Stable
        } else if m >= 0.6 {
            Self::Declining
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Stable => "stable",
            Self::Declining => "declining",
            Self::Poor => "poor",
        }
    }
}

impl fmt::Display for MomentumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Growing,
    Decaying,
    Stable,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Growing => "growing",
            Self::Decaying => "decaying",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MomentumReport {
    pub status: MomentumStatus,
    pub current_multiplier: f64,
    pub trend: Trend,
    pub streak_days: u32,
}

impl MomentumReport {
    pub fn no_data() -> Self {
        Self {
            status: MomentumStatus::NoData,
            current_multiplier: NEUTRAL,
            trend: Trend::Stable,
            streak_days: 0,
        }
    }
}

/// Which habits a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabitSelector {
    One(i64),
    /// Every active habit.
    All,
}

#[derive(Debug, Clone, Serialize)]
pub struct HabitMomentum {
    pub habit_id: i64,
    pub name: String,
    #[serde(flatten)]
    pub report: MomentumReport,
}

/// Summarize scores that are ascending by date. Missing dates are simply
/// absent; nothing is synthesized for them.
pub fn summarize(scores: &[HabitScore]) -> MomentumReport {
    let Some(latest) = scores.last() else {
        return MomentumReport::no_data();
    };
    let current = latest.momentum_multiplier;

    let recent = &scores[scores.len().saturating_sub(TREND_WINDOW)..];
    let trend = match (recent.first(), recent.len()) {
        (Some(earliest), n) if n >= 2 => {
            let earliest = earliest.momentum_multiplier;
            if current > earliest * GROWING_RATIO {
                Trend::Growing
            } else if current < earliest * DECAYING_RATIO {
                Trend::Decaying
            } else {
                Trend::Stable
            }
        }
        _ => Trend::Stable,
    };

    let streak_days = scores
        .iter()
        .rev()
        .take_while(|s| s.raw_score > 0.0)
        .count() as u32;

    MomentumReport {
        status: MomentumStatus::from_multiplier(current),
        current_multiplier: current,
        trend,
        streak_days,
    }
}

/// Momentum report for one habit as of `date`.
pub fn momentum_report<S: ScoreStore>(store: &S, habit_id: i64, date: NaiveDate) -> Result<MomentumReport> {
    let start = window_start(date, HISTORY_DAYS);
    let scores = store.habit_scores_between(habit_id, start, date)?;
    Ok(summarize(&scores))
}

/// Momentum reports for one habit or for every active habit.
pub fn get_momentum_report<S: ScoreStore>(
    store: &S,
    selector: HabitSelector,
    date: NaiveDate,
) -> Result<Vec<HabitMomentum>> {
    let habits = match selector {
        HabitSelector::One(id) => vec![store.habit(id)?.ok_or(ScoreError::HabitNotFound(id))?],
        HabitSelector::All => store.active_habits()?,
    };

    habits
        .into_iter()
        .map(|habit| -> Result<HabitMomentum> {
            Ok(HabitMomentum {
                report: momentum_report(store, habit.id, date)?,
                habit_id: habit.id,
                name: habit.name,
            })
        })
        .collect()
}
