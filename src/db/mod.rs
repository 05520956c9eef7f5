pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

const SCHEMA_VERSION: i32 = 2;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }
        if version < 2 {
            self.migrate_v2()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: habits, entries, derived scores, external readings
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS habits (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                name                 TEXT NOT NULL,
                category             TEXT NOT NULL,
                weight               REAL NOT NULL DEFAULT 1.0,
                target_days_per_week INTEGER NOT NULL DEFAULT 5,

                nonzero_threshold    REAL NOT NULL DEFAULT 0,
                goal_threshold       REAL NOT NULL,
                stretch_threshold    REAL NOT NULL,

                compound_rate        REAL NOT NULL DEFAULT 1.15,
                decay_rate           REAL NOT NULL DEFAULT 0.9,
                forgiveness_days     INTEGER NOT NULL DEFAULT 2,

                is_inverted          INTEGER NOT NULL DEFAULT 0,
                is_active            INTEGER NOT NULL DEFAULT 1,
                created_at           TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_habits_active ON habits(is_active);

            CREATE TABLE IF NOT EXISTS habit_entries (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                habit_id    INTEGER NOT NULL REFERENCES habits(id),
                date        TEXT NOT NULL,
                value       REAL NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(habit_id, date)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_date ON habit_entries(date);

            CREATE TABLE IF NOT EXISTS habit_scores (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                habit_id                INTEGER NOT NULL REFERENCES habits(id),
                date                    TEXT NOT NULL,
                raw_score               REAL NOT NULL,
                momentum_multiplier     REAL NOT NULL,
                final_score             REAL NOT NULL,
                weekly_completion_rate  REAL NOT NULL,
                computed_at             TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(habit_id, date)
            );

            CREATE INDEX IF NOT EXISTS idx_habit_scores_date ON habit_scores(date);

            CREATE TABLE IF NOT EXISTS daily_scores (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                date               TEXT NOT NULL UNIQUE,
                base_score         REAL NOT NULL,
                external_modifier  REAL NOT NULL DEFAULT 1.0,
                final_score        REAL NOT NULL,
                cumulative_score   REAL NOT NULL,
                computed_at        TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS external_readings (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                date            TEXT NOT NULL UNIQUE,
                sleep_score     REAL,
                hrv_ms          REAL,
                recovery_score  REAL,
                modifier        REAL,
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    /// V2: optional zero threshold for inverted habits
    fn migrate_v2(&self) -> Result<()> {
        try_add_column(&self.conn, "habits", "zero_threshold REAL DEFAULT NULL")
    }
}

/// Try to add a column, ignore if it already exists.
fn try_add_column(conn: &Connection, table: &str, column_def: &str) -> Result<()> {
    let sql = format!("ALTER TABLE {table} ADD COLUMN {column_def}");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column") => {
            log::debug!("{table}: column already present ({column_def})");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
