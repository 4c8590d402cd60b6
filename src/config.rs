use std::sync::OnceLock;

use anyhow::{anyhow, Result};

/// Runtime settings, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Comma-separated feed URLs from IMPORT_FEEDS.
    pub import_feeds: Vec<String>,
    /// Six-field cron expression (sec min hour day month weekday).
    pub cron_schedule: String,
    pub worker_concurrency: usize,
    pub redis_url: String,
    pub database_url: String,
    pub port: u16,
}

pub static SETTINGS: OnceLock<Settings> = OnceLock::new();

impl Settings {
    pub fn from_env() -> Self {
        Self {
            import_feeds: parse_feed_list(&std::env::var("IMPORT_FEEDS").unwrap_or_default()),
            cron_schedule: env_or("CRON_SCHEDULE", "0 0 * * * *"),
            worker_concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            database_url: env_or("DATABASE_URL", "sqlite://jobsync.db?mode=rwc"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4000),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            import_feeds: Vec::new(),
            cron_schedule: "0 0 * * * *".to_string(),
            worker_concurrency: 5,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: "sqlite://jobsync.db?mode=rwc".to_string(),
            port: 4000,
        }
    }
}

pub fn parse_feed_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn set_settings(settings: Settings) -> Result<()> {
    SETTINGS
        .set(settings)
        .map_err(|_| anyhow!("Settings already initialized"))
}

pub fn get_settings() -> &'static Settings {
    SETTINGS.get().expect("Settings are not set")
}

pub fn get_redis_url() -> &'static str {
    &get_settings().redis_url
}
