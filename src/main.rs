use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use upward::db::models::{DailyScore, Habit, HabitEntry, HabitUpdate, NewHabit};
use upward::db::Database;
use upward::report::{HabitMomentum, HabitSelector};
use upward::scoring::store::ScoreStore;
use upward::scoring::window_start;

#[derive(Parser)]
#[command(name = "upward", version, about = "Daily habit scoring with momentum")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage habit definitions
    Habit {
        #[command(subcommand)]
        command: HabitCommand,
    },

    /// Log a value for a habit and rescore that day
    Log {
        /// Habit id or name
        habit: String,

        /// Value (minutes, pages, count, 1 for done...)
        value: f64,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// List logged values for a day, or one habit's recent values
    Entries {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Habit id or name (lists its last --days days ending at --date)
        #[arg(long)]
        habit: Option<String>,

        /// Number of days when --habit is given
        #[arg(long, default_value = "30")]
        days: u32,
    },

    /// Log many values from a JSON file
    LogBatch {
        /// File with {"entries": [{"habit_id", "date", "value"}]}
        file: PathBuf,
    },

    /// Record sleep / HRV / recovery readings for a day
    Reading {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Sleep performance, 0-100
        #[arg(long)]
        sleep: Option<f64>,

        /// Heart-rate variability in milliseconds
        #[arg(long)]
        hrv: Option<f64>,

        /// Recovery, 0-100
        #[arg(long)]
        recovery: Option<f64>,
    },

    /// Compute and store the score for one day
    Score {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Recompute a range of days in order (refreshes momentum chains)
    Recalc {
        /// First date (defaults to recalc_window_days before --end)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last date (defaults to today)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Show momentum status per habit
    Momentum {
        /// Habit id or name (defaults to all active habits)
        #[arg(long)]
        habit: Option<String>,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Today at a glance: scores, weekly comparison, streaks, momentum
    Summary,

    /// Score statistics over recent days
    Trends {
        /// Number of days (defaults to config summary.trend_days)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Stored scores for recent days
    History {
        /// Habit id or name (defaults to daily totals)
        #[arg(long)]
        habit: Option<String>,

        /// Number of days
        #[arg(long, default_value = "14")]
        days: u32,
    },

    /// Completed days this week vs target, per habit
    Progress {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Which recent days have recovery readings
    Coverage {
        /// Number of days (defaults to config summary.coverage_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
enum HabitCommand {
    /// Add a habit
    Add {
        name: String,

        /// Value that counts as meeting the goal
        #[arg(long)]
        goal: f64,

        /// Value that counts as a stretch day
        #[arg(long)]
        stretch: f64,

        /// Smallest value that counts as any effort
        #[arg(long, default_value = "0")]
        nonzero: f64,

        /// Value regarded as no effort at all (inverted habits)
        #[arg(long)]
        zero: Option<f64>,

        /// Kind of measurement (binary, duration, pages, count...)
        #[arg(long, default_value = "binary")]
        category: String,

        #[arg(long, default_value = "1.0")]
        weight: f64,

        /// Days per week the habit should be done
        #[arg(long, default_value = "5")]
        target_days: u32,

        /// Lower values are better
        #[arg(long)]
        inverted: bool,

        #[arg(long, default_value = "1.15")]
        compound_rate: f64,

        #[arg(long, default_value = "0.9")]
        decay_rate: f64,

        #[arg(long, default_value = "2")]
        forgiveness_days: u32,
    },

    /// Change part of a habit's definition
    Update {
        /// Habit id or name
        habit: String,

        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        goal: Option<f64>,
        #[arg(long)]
        stretch: Option<f64>,
        #[arg(long)]
        nonzero: Option<f64>,
        #[arg(long)]
        zero: Option<f64>,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        target_days: Option<u32>,
        #[arg(long)]
        inverted: Option<bool>,
        #[arg(long)]
        compound_rate: Option<f64>,
        #[arg(long)]
        decay_rate: Option<f64>,
        #[arg(long)]
        forgiveness_days: Option<u32>,
        /// Re-activate (true) or deactivate (false)
        #[arg(long)]
        active: Option<bool>,
    },

    /// List habits
    List {
        /// Include deactivated habits
        #[arg(long)]
        all: bool,
    },

    /// Stop scoring a habit (history is kept)
    Deactivate {
        /// Habit id or name
        habit: String,
    },

    /// Import habits from a JSON file ({"habits": [...]})
    Import { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = upward::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(upward::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    let seeded = upward::habits::seed_defaults(&db, &config.default_habits)
        .context("Failed to load default habits")?;
    if seeded > 0 {
        log::info!("Loaded {} default habits from config", seeded);
    }

    let today = Local::now().date_naive();
    let json = cli.json;

    match cli.command {
        Commands::Habit { command } => run_habit_command(&db, command, json)?,

        Commands::Log { habit, value, date } => {
            let habit = resolve_habit(&db, &habit)?;
            let date = date.unwrap_or(today);
            let daily = upward::entries::submit_entry(&db, habit.id, date, value)
                .context("Failed to log entry")?;
            if json {
                print_json(&daily)?;
            } else {
                println!("Logged {} = {} on {}", habit.name, value, date);
                print_daily(&daily);
            }
        }

        Commands::Entries { date, habit, days } => {
            let date = date.unwrap_or(today);
            let entries = match &habit {
                Some(h) => {
                    let habit = resolve_habit(&db, h)?;
                    db.entries_between(habit.id, window_start(date, u64::from(days)), date)
                        .context("Query failed")?
                }
                None => db.entries_on(date).context("Query failed")?,
            };
            if json {
                print_json(&entries)?;
            } else {
                let habits = db.list_habits(true).context("Query failed")?;
                print_entry_table(&entries, &habits);
            }
        }

        Commands::LogBatch { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries = upward::entries::parse_batch(&contents).context("Failed to parse batch")?;
            let result = upward::entries::submit_batch(&db, &entries).context("Batch failed")?;
            if json {
                print_json(&result)?;
            } else {
                println!(
                    "Batch complete: {} entries, {} days rescored",
                    result.submitted,
                    result.scores.len()
                );
                print_daily_table(&result.scores);
            }
        }

        Commands::Reading { date, sleep, hrv, recovery } => {
            if sleep.is_none() && hrv.is_none() && recovery.is_none() {
                anyhow::bail!("Nothing to record. Pass at least one of --sleep, --hrv, --recovery.");
            }
            let date = date.unwrap_or(today);
            let modifier = upward::readings::record_reading(&db, date, sleep, hrv, recovery)
                .context("Failed to record reading")?;

            // Keep an existing day score in step with its reading
            let daily = if db.daily_score(date).context("Query failed")?.is_some() {
                Some(upward::scoring::compute_score_for_date(&db, date).context("Rescore failed")?)
            } else {
                None
            };

            if json {
                #[derive(Serialize)]
                struct Out {
                    date: NaiveDate,
                    modifier: f64,
                    daily: Option<DailyScore>,
                }
                print_json(&Out { date, modifier, daily })?;
            } else {
                println!("Recorded reading for {}: modifier {:.2}x", date, modifier);
                if let Some(daily) = &daily {
                    print_daily(daily);
                }
            }
        }

        Commands::Score { date } => {
            let date = date.unwrap_or(today);
            let daily = upward::scoring::compute_score_for_date(&db, date)
                .context("Scoring failed")?;
            let habits = db.list_habits(true).context("Query failed")?;
            let scores = db.habit_scores_on(date).context("Query failed")?;
            if json {
                #[derive(Serialize)]
                struct Out<'a> {
                    daily: &'a DailyScore,
                    habits: &'a [upward::db::models::HabitScore],
                }
                print_json(&Out { daily: &daily, habits: &scores })?;
            } else {
                println!("{:<25} {:>6} {:>6} {:>6} {:>6}", "Habit", "Raw", "Mom", "Final", "Week");
                println!("{}", "-".repeat(53));
                for s in &scores {
                    let name = habits
                        .iter()
                        .find(|h| h.id == s.habit_id)
                        .map_or("?", |h| h.name.as_str());
                    println!(
                        "{:<25} {:>6.2} {:>6.3} {:>6.2} {:>5.0}%",
                        truncate(name, 25),
                        s.raw_score,
                        s.momentum_multiplier,
                        s.final_score,
                        s.weekly_completion_rate * 100.0
                    );
                }
                println!();
                print_daily(&daily);
            }
        }

        Commands::Recalc { start, end } => {
            let end = end.unwrap_or(today);
            let window = config.recalc_window_days.max(1) as u64;
            let start = start.unwrap_or_else(|| window_start(end, window));
            if start > end {
                anyhow::bail!("--start {} is after --end {}", start, end);
            }

            let total = upward::scoring::daily::day_count(start, end);
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                    .context("Invalid progress template")?
                    .progress_chars("#>-"),
            );
            let result = upward::scoring::daily::recompute_range_with(&db, start, end, |date, _| {
                pb.set_message(date.to_string());
                pb.inc(1);
            });
            pb.finish_with_message(format!(
                "Done: {} recomputed, {} failed",
                result.recomputed.len(),
                result.failed.len()
            ));

            for (date, err) in &result.failed {
                eprintln!("  {}: {}", date, err);
            }
        }

        Commands::Momentum { habit, date } => {
            let date = date.unwrap_or(today);
            let selector = match habit {
                Some(h) => HabitSelector::One(resolve_habit(&db, &h)?.id),
                None => HabitSelector::All,
            };
            let reports = upward::report::get_momentum_report(&db, selector, date)
                .context("Momentum report failed")?;
            if json {
                print_json(&reports)?;
            } else {
                print_momentum_table(&reports);
            }
        }

        Commands::Summary => {
            let s = upward::summary::scores_summary(&db, today).context("Summary failed")?;
            if json {
                print_json(&s)?;
            } else {
                println!("Summary for {}", s.date);
                println!("====================");
                println!("Today:            {}", fmt_score(s.today));
                println!("Yesterday:        {}", fmt_score(s.yesterday));
                println!("Cumulative:       {:.2}", s.cumulative);
                println!("This week avg:    {:.3}", s.current_week_avg);
                println!("Last week avg:    {:.3}", s.previous_week_avg);
                println!("Week over week:   {:+.1}%", s.week_over_week_pct);
                println!("Current streak:   {} days", s.current_streak);
                println!("Longest streak:   {} days", s.longest_streak);
                if !s.momentum.is_empty() {
                    println!();
                    print_momentum_table(&s.momentum);
                }
            }
        }

        Commands::Trends { days } => {
            let days = days.unwrap_or(config.summary.trend_days);
            let trends = upward::summary::score_trends(&db, today, days).context("Query failed")?;
            match trends {
                Some(t) if json => print_json(&t)?,
                Some(t) => {
                    println!("Last {} days ({} scored)", t.days, t.recorded_days);
                    println!("Average:     {:.3}", t.average);
                    println!("Best:        {:.3} on {}", t.best_day.score, t.best_day.date);
                    println!("Worst:       {:.3} on {}", t.worst_day.score, t.worst_day.date);
                    println!("Cumulative:  {:.2}", t.total_cumulative);
                    if !t.moving_averages.is_empty() {
                        println!();
                        println!("7-day moving average:");
                        for p in &t.moving_averages {
                            println!("  {}  {:.3}", p.date, p.score);
                        }
                    }
                }
                None => println!("No scores in the last {} days.", days),
            }
        }

        Commands::History { habit, days } => {
            let start = window_start(today, u64::from(days));
            match habit {
                Some(h) => {
                    let habit = resolve_habit(&db, &h)?;
                    let scores = db
                        .habit_scores_between(habit.id, start, today)
                        .context("Query failed")?;
                    if json {
                        print_json(&scores)?;
                    } else {
                        println!("{}", habit.name);
                        println!("{:<10} {:>6} {:>6} {:>6} {:>6}", "Date", "Raw", "Mom", "Final", "Week");
                        println!("{}", "-".repeat(38));
                        for s in &scores {
                            println!(
                                "{:<10} {:>6.2} {:>6.3} {:>6.2} {:>5.0}%",
                                s.date,
                                s.raw_score,
                                s.momentum_multiplier,
                                s.final_score,
                                s.weekly_completion_rate * 100.0
                            );
                        }
                    }
                }
                None => {
                    let scores = db.daily_scores_between(start, today).context("Query failed")?;
                    if json {
                        print_json(&scores)?;
                    } else {
                        print_daily_table(&scores);
                    }
                }
            }
        }

        Commands::Progress { date } => {
            let date = date.unwrap_or(today);
            let progress = upward::summary::weekly_progress(&db, date).context("Query failed")?;
            if json {
                print_json(&progress)?;
            } else {
                println!("{:<25} {:>5} {:>7}  {}", "Habit", "Done", "Target", "Tier");
                println!("{}", "-".repeat(48));
                for p in &progress {
                    println!(
                        "{:<25} {:>5} {:>7}  {}",
                        truncate(&p.name, 25),
                        p.completed_days,
                        p.target_days,
                        p.tier
                    );
                }
            }
        }

        Commands::Coverage { days } => {
            let days = days.unwrap_or(config.summary.coverage_days);
            let c = upward::readings::coverage(&db, today, days).context("Query failed")?;
            if json {
                print_json(&c)?;
            } else {
                println!(
                    "Readings on {} of {} days ({:.0}%)",
                    c.covered,
                    c.days,
                    c.fraction * 100.0
                );
                match c.latest {
                    Some(d) => println!("Latest reading: {}", d),
                    None => println!("No readings recorded."),
                }
                if !c.missing_dates.is_empty() {
                    println!("Missing:");
                    for d in &c.missing_dates {
                        println!("  {}", d);
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_habit_command(db: &Database, command: HabitCommand, json: bool) -> Result<()> {
    match command {
        HabitCommand::Add {
            name,
            goal,
            stretch,
            nonzero,
            zero,
            category,
            weight,
            target_days,
            inverted,
            compound_rate,
            decay_rate,
            forgiveness_days,
        } => {
            let new = NewHabit {
                category,
                weight,
                target_days_per_week: target_days,
                nonzero_threshold: nonzero,
                zero_threshold: zero,
                compound_rate,
                decay_rate,
                forgiveness_days,
                is_inverted: inverted,
                ..NewHabit::new(&name, goal, stretch)
            };
            let habit = upward::habits::create_habit(db, &new).context("Failed to add habit")?;
            println!("Added habit {}: {}", habit.id, habit.name);
        }

        HabitCommand::Update {
            habit,
            name,
            goal,
            stretch,
            nonzero,
            zero,
            weight,
            target_days,
            inverted,
            compound_rate,
            decay_rate,
            forgiveness_days,
            active,
        } => {
            let id = resolve_habit(db, &habit)?.id;
            let update = HabitUpdate {
                name,
                weight,
                target_days_per_week: target_days,
                nonzero_threshold: nonzero,
                goal_threshold: goal,
                stretch_threshold: stretch,
                zero_threshold: zero,
                compound_rate,
                decay_rate,
                forgiveness_days,
                is_inverted: inverted,
                is_active: active,
            };
            let habit = upward::habits::update_habit(db, id, &update).context("Failed to update habit")?;
            println!("Updated habit {}: {}", habit.id, habit.name);
        }

        HabitCommand::List { all } => {
            let habits = db.list_habits(all).context("Query failed")?;
            if json {
                print_json(&habits)?;
            } else {
                print_habit_table(&habits);
            }
        }

        HabitCommand::Deactivate { habit } => {
            let habit = resolve_habit(db, &habit)?;
            upward::habits::deactivate_habit(db, habit.id).context("Failed to deactivate habit")?;
            println!("Deactivated habit {}: {}", habit.id, habit.name);
        }

        HabitCommand::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let habits = upward::habits::import_habits(db, &contents).context("Import failed")?;
            println!("Imported {} habits", habits.len());
            print_habit_table(&habits);
        }
    }
    Ok(())
}

/// Find a habit by numeric id or by (case-insensitive) name.
fn resolve_habit(db: &Database, key: &str) -> Result<Habit> {
    if let Ok(id) = key.parse::<i64>() {
        if let Some(habit) = db.habit(id).context("Query failed")? {
            return Ok(habit);
        }
    }
    db.list_habits(true)
        .context("Query failed")?
        .into_iter()
        .find(|h| h.name.eq_ignore_ascii_case(key))
        .with_context(|| format!("No habit matching '{}'", key))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

fn fmt_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.3}", s))
}

fn print_daily(d: &DailyScore) {
    println!(
        "{}: base {:.3} x {:.2} = {:.3}  (cumulative {:.2})",
        d.date, d.base_score, d.external_modifier, d.final_score, d.cumulative_score
    );
}

fn print_daily_table(scores: &[DailyScore]) {
    println!("{:<10} {:>7} {:>6} {:>7} {:>10}", "Date", "Base", "Ext", "Final", "Cumulative");
    println!("{}", "-".repeat(44));
    for d in scores {
        println!(
            "{:<10} {:>7.3} {:>6.2} {:>7.3} {:>10.2}",
            d.date, d.base_score, d.external_modifier, d.final_score, d.cumulative_score
        );
    }
}

fn print_entry_table(entries: &[HabitEntry], habits: &[Habit]) {
    println!("{:<10} {:<25} {:>10}", "Date", "Habit", "Value");
    println!("{}", "-".repeat(47));
    for e in entries {
        let name = habits
            .iter()
            .find(|h| h.id == e.habit_id)
            .map_or("?", |h| h.name.as_str());
        println!("{:<10} {:<25} {:>10}", e.date, truncate(name, 25), e.value);
    }
}

fn print_habit_table(habits: &[Habit]) {
    println!(
        "{:>4} {:<25} {:<9} {:>5} {:>4} {:>8} {:>8} {:>8}  {}",
        "Id", "Name", "Type", "Wt", "Tgt", "Nonzero", "Goal", "Stretch", "Flags"
    );
    println!("{}", "-".repeat(90));
    for h in habits {
        let mut flags = Vec::new();
        if h.is_inverted {
            flags.push("inverted");
        }
        if !h.is_active {
            flags.push("inactive");
        }
        println!(
            "{:>4} {:<25} {:<9} {:>5.2} {:>4} {:>8} {:>8} {:>8}  {}",
            h.id,
            truncate(&h.name, 25),
            truncate(&h.category, 9),
            h.weight,
            h.target_days_per_week,
            h.thresholds.nonzero,
            h.thresholds.goal,
            h.thresholds.stretch,
            flags.join(",")
        );
    }
}

fn print_momentum_table(reports: &[HabitMomentum]) {
    println!("{:<25} {:>7} {:<10} {:<9} {:>6}", "Habit", "Mult", "Status", "Trend", "Streak");
    println!("{}", "-".repeat(61));
    for r in reports {
        println!(
            "{:<25} {:>6.3}x {:<10} {:<9} {:>6}",
            truncate(&r.name, 25),
            r.report.current_multiplier,
            r.report.status,
            r.report.trend,
            r.report.streak_days
        );
    }
}
