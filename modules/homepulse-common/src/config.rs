use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Metric windows (days) for moving averages and percent changes
    pub metric_windows: Vec<u32>,

    // Rollup history retention (days of daily rows kept per region)
    pub daily_history_days: usize,

    // Sweep policy
    pub stale_after_days: i64,
    pub archive_retention_days: i64,

    // Ingest worker pool width
    pub ingest_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            metric_windows: env::var("METRIC_WINDOWS")
                .map(|raw| parse_windows(&raw))
                .unwrap_or_else(|_| vec![7, 30, 90]),
            daily_history_days: env::var("DAILY_HISTORY_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("DAILY_HISTORY_DAYS must be a number"),
            stale_after_days: env::var("STALE_AFTER_DAYS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("STALE_AFTER_DAYS must be a number"),
            archive_retention_days: env::var("ARCHIVE_RETENTION_DAYS")
                .unwrap_or_else(|_| "365".to_string())
                .parse()
                .expect("ARCHIVE_RETENTION_DAYS must be a number"),
            ingest_concurrency: env::var("INGEST_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .expect("INGEST_CONCURRENCY must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_windows(raw: &str) -> Vec<u32> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse()
                .unwrap_or_else(|_| panic!("METRIC_WINDOWS must be comma-separated day counts, got: {part}"))
        })
        .collect()
}
