pub mod activity;
pub mod contests;
pub mod scores;

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tracing::info;

pub use activity::{ActivityLogStore, ActivitySink};
pub use contests::ContestStore;
pub use scores::ScoreStore;

/// Open the SQLite pool and make sure the schema exists
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>> {
    let in_memory = database_url.contains(":memory:");

    // Create data directory if needed
    if !in_memory {
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            let path = path.trim_start_matches("//");
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create database directory")?;
                }
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid database URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    // An in-memory database lives and dies with its one connection
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    info!("Database initialized");
    Ok(pool)
}

/// Initialize database schema
async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS leagues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            sport TEXT NOT NULL,
            periods INTEGER NOT NULL CHECK (periods > 0),
            quarters_score_as_halves BOOLEAN NOT NULL DEFAULT 0,
            espn_slug TEXT UNIQUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            display_name TEXT,
            kind TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT 0,
            chances INTEGER NOT NULL DEFAULT 0 CHECK (chances >= 0)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS contests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            league_id INTEGER NOT NULL REFERENCES leagues (id),
            starts_at TEXT NOT NULL,
            timezone TEXT NOT NULL,
            period_prize INTEGER NOT NULL DEFAULT 0,
            final_prize INTEGER NOT NULL DEFAULT 0,
            score_url TEXT UNIQUE,
            status TEXT NOT NULL DEFAULT 'upcoming',
            grid TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS scores (
            contest_id INTEGER NOT NULL REFERENCES contests (id) ON DELETE CASCADE,
            period INTEGER NOT NULL CHECK (period > 0),
            away INTEGER NOT NULL,
            home INTEGER NOT NULL,
            away_total INTEGER NOT NULL,
            home_total INTEGER NOT NULL,
            complete BOOLEAN NOT NULL DEFAULT 0,
            overtime BOOLEAN NOT NULL DEFAULT 0,
            non_scoring BOOLEAN NOT NULL DEFAULT 0,
            prize INTEGER NOT NULL DEFAULT 0,
            winner_id INTEGER NOT NULL REFERENCES participants (id),
            PRIMARY KEY (contest_id, period)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS activity_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            record_type TEXT NOT NULL,
            record_id INTEGER,
            level TEXT NOT NULL DEFAULT 'info',
            metadata TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_contests_status ON contests (status)",
        "CREATE INDEX IF NOT EXISTS idx_contests_starts_at ON contests (starts_at)",
        "CREATE INDEX IF NOT EXISTS idx_activity_record ON activity_logs (record_type, record_id)",
        "CREATE INDEX IF NOT EXISTS idx_activity_created ON activity_logs (created_at)",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to initialize schema")?;
    }

    Ok(())
}

/// Timestamps are stored as fixed-width UTC RFC 3339 so text order is time order
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
