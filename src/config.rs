use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::db::models::NewHabit;

/// Upper bound for `recalc_window_days`, about ten years.
pub const MAX_RECALC_WINDOW_DAYS: i64 = 3660;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Days covered by `recalc` when no range is given (1..=3660).
    pub recalc_window_days: i64,
    /// Reporting windows.
    pub summary: SummaryConfig,
    /// Habits seeded into an empty database.
    #[serde(rename = "habits")]
    pub default_habits: Vec<NewHabit>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            recalc_window_days: 30,
            summary: SummaryConfig::default(),
            default_habits: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Window for `trends` when `--days` is not given.
    pub trend_days: u32,
    /// Window for `coverage` when `--days` is not given.
    pub coverage_days: u32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            trend_days: 30,
            coverage_days: 30,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/upward/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Parse config text. Out-of-range numbers are clamped, not rejected.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(contents)?;
        let window = config.recalc_window_days.clamp(1, MAX_RECALC_WINDOW_DAYS);
        if window != config.recalc_window_days {
            log::warn!(
                "recalc_window_days = {} is out of range, using {}",
                config.recalc_window_days,
                window
            );
            config.recalc_window_days = window;
        }
        Ok(config)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("upward.db")
    } else {
        // Fallback: current directory
        PathBuf::from("upward.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.db_path.is_none());
        assert_eq!(config.recalc_window_days, 30);
        assert_eq!(config.summary.trend_days, 30);
        assert!(config.default_habits.is_empty());
    }

    #[test]
    fn test_habits_and_partial_sections() {
        let config = AppConfig::parse(
            r#"
            db_path = "/tmp/upward.db"

            [summary]
            coverage_days = 14

            [[habits]]
            name = "Reading"
            habit_type = "duration"
            goal_threshold = 30.0
            stretch_threshold = 60.0

            [[habits]]
            name = "Screen Time (Post 9PM)"
            nonzero_threshold = 120.0
            goal_threshold = 45.0
            stretch_threshold = 15.0
            is_inverted = true
            weight = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/upward.db")));
        assert_eq!(config.summary.coverage_days, 14);
        assert_eq!(config.summary.trend_days, 30);
        assert_eq!(config.default_habits.len(), 2);
        assert_eq!(config.default_habits[0].category, "duration");
        assert!(config.default_habits[1].is_inverted);
    }

    #[test]
    fn test_recalc_window_is_clamped() {
        let config = AppConfig::parse("recalc_window_days = 9223372036854775807").unwrap();
        assert_eq!(config.recalc_window_days, MAX_RECALC_WINDOW_DAYS);
        let config = AppConfig::parse("recalc_window_days = -4").unwrap();
        assert_eq!(config.recalc_window_days, 1);
    }

    #[test]
    fn test_bad_type_is_an_error() {
        assert!(AppConfig::parse("recalc_window_days = \"soon\"").is_err());
    }
}
