//! Read-only analytics over stored daily scores: the at-a-glance summary,
//! longer-range trends, and per-habit weekly progress.

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::DailyScore;
use crate::db::Database;
use crate::report::{get_momentum_report, HabitMomentum, HabitSelector};
use crate::scoring::store::ScoreStore;
use crate::scoring::weekly::{self, WeeklyTier, WINDOW_DAYS};
use crate::scoring::{window_start, Result};

/// Records per moving-average point.
pub const MOVING_AVERAGE_WINDOW: usize = 7;

#[derive(Debug, Clone, Serialize)]
pub struct ScoresSummary {
    pub date: NaiveDate,
    pub today: Option<f64>,
    pub yesterday: Option<f64>,
    pub cumulative: f64,
    pub current_week_avg: f64,
    pub previous_week_avg: f64,
    pub week_over_week_pct: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub momentum: Vec<HabitMomentum>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayScore {
    pub date: NaiveDate,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreTrends {
    pub days: u32,
    pub recorded_days: usize,
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub total_cumulative: f64,
    pub best_day: DayScore,
    pub worst_day: DayScore,
    pub moving_averages: Vec<DayScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HabitProgress {
    pub habit_id: i64,
    pub name: String,
    pub completed_days: u32,
    pub target_days: u32,
    pub completion_rate: f64,
    pub tier: WeeklyTier,
}

fn average(scores: &[&DailyScore]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| s.final_score).sum::<f64>() / scores.len() as f64
    }
}

/// Lengths of runs of consecutive calendar days with a positive final score.
/// Returns `(run ending at the last record, longest run)`.
fn streaks(scores: &[DailyScore]) -> (u32, u32) {
    let mut current = 0u32;
    let mut longest = 0u32;
    let mut prev: Option<NaiveDate> = None;

    for s in scores {
        let contiguous = prev.and_then(|p| p.succ_opt()) == Some(s.date);
        current = if s.final_score <= 0.0 {
            0
        } else if contiguous {
            current + 1
        } else {
            1
        };
        longest = longest.max(current);
        prev = Some(s.date);
    }
    (current, longest)
}

pub fn scores_summary(db: &Database, today: NaiveDate) -> Result<ScoresSummary> {
    let history = db.daily_scores_through(today)?;
    let find = |date: NaiveDate| history.iter().rev().find(|s| s.date == date);
    let today_score = find(today);
    let yesterday_score = today.pred_opt().and_then(find);
    let cumulative = today_score
        .or(yesterday_score)
        .map_or(0.0, |s| s.cumulative_score);

    let week_start = window_start(today, WINDOW_DAYS);
    let current_week: Vec<&DailyScore> = history.iter().filter(|s| s.date >= week_start).collect();
    // empty when the current week already starts at the earliest date
    let previous_week: Vec<&DailyScore> = match week_start.pred_opt() {
        Some(prev_end) => {
            let prev_start = window_start(prev_end, WINDOW_DAYS);
            history
                .iter()
                .filter(|s| s.date >= prev_start && s.date <= prev_end)
                .collect()
        }
        None => Vec::new(),
    };
    let current_week_avg = average(&current_week);
    let previous_week_avg = average(&previous_week);
    let week_over_week_pct = if previous_week_avg > 0.0 {
        (current_week_avg - previous_week_avg) / previous_week_avg * 100.0
    } else {
        0.0
    };

    let (current_streak, longest_streak) = streaks(&history);

    Ok(ScoresSummary {
        date: today,
        today: today_score.map(|s| s.final_score),
        yesterday: yesterday_score.map(|s| s.final_score),
        cumulative,
        current_week_avg,
        previous_week_avg,
        week_over_week_pct,
        current_streak,
        longest_streak,
        momentum: get_momentum_report(db, HabitSelector::All, today)?,
    })
}

/// Statistics over the `days` days ending at `today`. None if nothing is stored.
pub fn score_trends(db: &Database, today: NaiveDate, days: u32) -> Result<Option<ScoreTrends>> {
    if days == 0 {
        return Ok(None);
    }
    let start = window_start(today, u64::from(days));
    let scores = db.daily_scores_between(start, today)?;
    let (Some(first), Some(last)) = (scores.first(), scores.last()) else {
        return Ok(None);
    };

    let mut best = first;
    let mut worst = first;
    for s in &scores {
        if s.final_score > best.final_score {
            best = s;
        }
        if s.final_score < worst.final_score {
            worst = s;
        }
    }

    let moving_averages = scores
        .windows(MOVING_AVERAGE_WINDOW)
        .filter_map(|w| {
            let end = w.last()?;
            let avg = w.iter().map(|s| s.final_score).sum::<f64>() / w.len() as f64;
            Some(DayScore { date: end.date, score: avg })
        })
        .collect();

    let total: f64 = scores.iter().map(|s| s.final_score).sum();
    Ok(Some(ScoreTrends {
        days,
        recorded_days: scores.len(),
        average: total / scores.len() as f64,
        max: best.final_score,
        min: worst.final_score,
        total_cumulative: last.cumulative_score,
        best_day: DayScore { date: best.date, score: best.final_score },
        worst_day: DayScore { date: worst.date, score: worst.final_score },
        moving_averages,
    }))
}

/// Completed days in the trailing week for every active habit.
pub fn weekly_progress(db: &Database, date: NaiveDate) -> Result<Vec<HabitProgress>> {
    let mut progress = Vec::new();

    for habit in db.active_habits()? {
        let completed_days = weekly::completed_days(db, habit.id, date)?;
        progress.push(HabitProgress {
            habit_id: habit.id,
            completed_days,
            target_days: habit.target_days_per_week,
            completion_rate: weekly::rate(completed_days),
            tier: weekly::classify(
                completed_days,
                habit.target_days_per_week,
                habit.momentum.forgiveness_days,
            ),
            name: habit.name,
        });
    }
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{HabitEntry, NewHabit};
    use chrono::Duration;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(n)
    }

    /// Store daily scores directly; cumulative is the running sum.
    fn store_days(db: &Database, scores: &[(i64, f64)]) {
        let mut cumulative = 0.0;
        for &(n, score) in scores {
            cumulative += score;
            db.upsert_daily_score(&DailyScore {
                date: day(n),
                base_score: score,
                external_modifier: 1.0,
                final_score: score,
                cumulative_score: cumulative,
            })
            .unwrap();
        }
    }

    #[test]
    fn test_summary_without_data() {
        let db = Database::open_in_memory().unwrap();
        let s = scores_summary(&db, day(0)).unwrap();
        assert_eq!(s.today, None);
        assert_eq!(s.cumulative, 0.0);
        assert_eq!(s.week_over_week_pct, 0.0);
        assert_eq!(s.current_streak, 0);
        assert!(s.momentum.is_empty());
    }

    #[test]
    fn test_summary_week_comparison() {
        let db = Database::open_in_memory().unwrap();
        // previous week (days 0..=6) averages 1.0, current week (7..=13) 1.5
        let scores: Vec<(i64, f64)> = (0..14).map(|n| (n, if n < 7 { 1.0 } else { 1.5 })).collect();
        store_days(&db, &scores);

        let s = scores_summary(&db, day(13)).unwrap();
        assert_eq!(s.today, Some(1.5));
        assert_eq!(s.yesterday, Some(1.5));
        assert!((s.cumulative - 17.5).abs() < 1e-9);
        assert!((s.current_week_avg - 1.5).abs() < 1e-9);
        assert!((s.previous_week_avg - 1.0).abs() < 1e-9);
        assert!((s.week_over_week_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_cumulative_falls_back_to_yesterday() {
        let db = Database::open_in_memory().unwrap();
        store_days(&db, &[(0, 1.0), (1, 2.0)]);
        let s = scores_summary(&db, day(2)).unwrap();
        assert_eq!(s.today, None);
        assert_eq!(s.yesterday, Some(2.0));
        assert!((s.cumulative - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_streaks_need_consecutive_positive_days() {
        let db = Database::open_in_memory().unwrap();
        // run of 3, a zero, run of 2, a gap at day 7, then 1
        store_days(&db, &[(0, 1.0), (1, 1.0), (2, 1.0), (3, 0.0), (4, 1.0), (5, 1.0), (7, 1.0)]);

        let s = scores_summary(&db, day(7)).unwrap();
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.longest_streak, 3);

        let s = scores_summary(&db, day(5)).unwrap();
        assert_eq!(s.current_streak, 2);
    }

    #[test]
    fn test_trends() {
        let db = Database::open_in_memory().unwrap();
        assert!(score_trends(&db, day(0), 30).unwrap().is_none());

        let scores: Vec<(i64, f64)> = (0..8).map(|n| (n, n as f64)).collect();
        store_days(&db, &scores);

        let t = score_trends(&db, day(7), 30).unwrap().unwrap();
        assert_eq!(t.recorded_days, 8);
        assert!((t.average - 3.5).abs() < 1e-9);
        assert_eq!(t.max, 7.0);
        assert_eq!(t.min, 0.0);
        assert_eq!(t.best_day.date, day(7));
        assert_eq!(t.worst_day.date, day(0));
        assert!((t.total_cumulative - 28.0).abs() < 1e-9);

        // two full 7-record windows: 0..=6 and 1..=7
        assert_eq!(t.moving_averages.len(), 2);
        assert_eq!(t.moving_averages[0], DayScore { date: day(6), score: 3.0 });
        assert_eq!(t.moving_averages[1], DayScore { date: day(7), score: 4.0 });

        // narrower window only sees the last three days
        let t = score_trends(&db, day(7), 3).unwrap().unwrap();
        assert_eq!(t.recorded_days, 3);
        assert!(t.moving_averages.is_empty());
    }

    #[test]
    fn test_huge_or_early_windows_do_not_overflow() {
        let db = Database::open_in_memory().unwrap();
        store_days(&db, &[(0, 1.0), (1, 2.0)]);

        let t = score_trends(&db, day(1), u32::MAX).unwrap().unwrap();
        assert_eq!(t.recorded_days, 2);

        let s = scores_summary(&db, NaiveDate::MIN).unwrap();
        assert_eq!(s.today, None);
        assert_eq!(s.previous_week_avg, 0.0);
    }

    #[test]
    fn test_weekly_progress() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_habit(&NewHabit::new("Reading", 30.0, 60.0)).unwrap();
        let gone = db.insert_habit(&NewHabit::new("Piano", 15.0, 30.0)).unwrap();
        db.set_habit_active(gone, false).unwrap();

        for (n, v) in [(0, 30.0), (2, 10.0), (3, 0.0), (4, 60.0), (5, 30.0), (6, 30.0)] {
            db.upsert_entry(&HabitEntry { habit_id: id, date: day(n), value: v }).unwrap();
        }

        let progress = weekly_progress(&db, day(6)).unwrap();
        assert_eq!(progress.len(), 1);
        let p = &progress[0];
        assert_eq!(p.name, "Reading");
        assert_eq!(p.completed_days, 5);
        assert_eq!(p.target_days, 5);
        assert_eq!(p.tier, WeeklyTier::Meet);
    }
}
