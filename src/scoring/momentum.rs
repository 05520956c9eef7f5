//! Per-habit momentum multiplier.
//!
//! Momentum is a date-ordered chain: each day's multiplier is a function of
//! the previous calendar day's stored multiplier and today's weekly tier.
//! [`next_multiplier`] is the single transition; callers supply `previous`
//! so the ordering dependency stays visible at the call site.

use chrono::NaiveDate;

use super::store::{ScoreStore, StoreResult};
use super::weekly::WeeklyTier;
use crate::db::models::MomentumParams;

pub const NEUTRAL: f64 = 1.0;
pub const MIN_MULTIPLIER: f64 = 0.1;
pub const MAX_MULTIPLIER: f64 = 3.0;

const CLOSE_FLOOR: f64 = 0.5;
const MISS_FLOOR: f64 = 0.3;

/// Apply one day's tier to the previous multiplier.
pub fn next_multiplier(previous: f64, tier: WeeklyTier, params: &MomentumParams) -> f64 {
    let previous = if previous.is_finite() { previous } else { NEUTRAL };
    let decay = params.decay_rate;

    let next = match tier {
        WeeklyTier::Exceed => (previous * params.compound_rate).min(MAX_MULTIPLIER),
        WeeklyTier::Meet => previous,
        WeeklyTier::Close => (previous * decay).max(CLOSE_FLOOR),
        WeeklyTier::Miss => (previous * decay.powi(2)).max(MISS_FLOOR),
        WeeklyTier::Fail => (previous * decay.powi(3)).max(MIN_MULTIPLIER),
    };

    next.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
}

/// Fold a run of tiers (ascending by date) starting from `seed`.
///
/// Stored scoring walks dates one at a time through [`next_multiplier`];
/// this is for simulating a chain without a store, e.g. in tests.
pub fn fold_momentum<I>(seed: f64, tiers: I, params: &MomentumParams) -> f64
where
    I: IntoIterator<Item = WeeklyTier>,
{
    tiers
        .into_iter()
        .fold(seed, |prev, tier| next_multiplier(prev, tier, params))
}

/// Multiplier stored for exactly the day before `date`, or neutral.
///
/// Only the immediately preceding calendar day is consulted: a gap in
/// computed scores resets momentum to 1.0.
pub fn previous_multiplier<S: ScoreStore>(store: &S, habit_id: i64, date: NaiveDate) -> StoreResult<f64> {
    let Some(previous_day) = date.pred_opt() else {
        return Ok(NEUTRAL);
    };
    let previous = store.habit_score(habit_id, previous_day)?;
    Ok(previous.map_or(NEUTRAL, |s| s.momentum_multiplier))
}
