use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub database_url: String,

    /// Root of the structured score API
    pub espn_api_base_url: String,

    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: u64,

    /// Total fetch attempts for transient failures
    pub refresh_max_attempts: u32,

    /// First retry delay in seconds; doubles per attempt
    pub refresh_backoff_base_secs: u64,

    /// Upper bound for a single retry delay
    pub refresh_backoff_max_secs: u64,

    /// Interval in seconds between sweeps of active contests
    pub active_sweep_interval: u64,

    /// Seconds without a sweep before the queue counts as stalled
    pub heartbeat_stale_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data/squares.db".to_string()),

            espn_api_base_url: env::var("ESPN_API_BASE_URL").unwrap_or_else(|_| {
                "https://site.api.espn.com/apis/site/v2/sports".to_string()
            }),

            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("HTTP_TIMEOUT_SECS must be a valid number")?,

            refresh_max_attempts: env::var("REFRESH_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("REFRESH_MAX_ATTEMPTS must be a valid number")?,

            refresh_backoff_base_secs: env::var("REFRESH_BACKOFF_BASE_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("REFRESH_BACKOFF_BASE_SECS must be a valid number")?,

            refresh_backoff_max_secs: env::var("REFRESH_BACKOFF_MAX_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("REFRESH_BACKOFF_MAX_SECS must be a valid number")?,

            active_sweep_interval: env::var("ACTIVE_SWEEP_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("ACTIVE_SWEEP_INTERVAL must be a valid number")?,

            heartbeat_stale_secs: env::var("HEARTBEAT_STALE_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("HEARTBEAT_STALE_SECS must be a valid number")?,
        })
    }
}
