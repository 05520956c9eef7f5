pub mod config;
pub mod db;
pub mod entries;
pub mod habits;
pub mod readings;
pub mod report;
pub mod scoring;
pub mod summary;

/// Application name for XDG paths
pub const APP_NAME: &str = "upward";
