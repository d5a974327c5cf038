use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};

use super::{parse_timestamp, timestamp};
use crate::models::{ActivityAction, ActivityLevel, ActivityRecord, ActivitySubject};

/// Destination for structured audit entries
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, record: ActivityRecord) -> anyhow::Result<()>;
}

/// Append-only activity log backed by the `activity_logs` table
#[derive(Clone)]
pub struct ActivityLogStore {
    pool: Pool<Sqlite>,
}

impl ActivityLogStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<ActivityRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT * FROM activity_logs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(ActivityRow::into_record).collect())
    }

    /// Entries about one contest, oldest first
    pub async fn for_contest(&self, contest_id: i64) -> Result<Vec<ActivityRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT * FROM activity_logs
            WHERE record_type = 'Contest' AND record_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(contest_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(ActivityRow::into_record).collect())
    }

    pub async fn count_by_action(&self, action: ActivityAction) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM activity_logs WHERE action = ?")
                .bind(action.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

#[async_trait]
impl ActivitySink for ActivityLogStore {
    async fn record(&self, record: ActivityRecord) -> anyhow::Result<()> {
        let metadata = serde_json::to_string(&record.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO activity_logs (action, record_type, record_id, level, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.action.as_str())
        .bind(record.subject.record_type())
        .bind(record.subject.record_id())
        .bind(record.level.as_str())
        .bind(metadata)
        .bind(timestamp(record.created_at))
        .execute(&self.pool)
        .await?;

        debug!(
            "Activity {} logged as #{}",
            record.action.as_str(),
            result.last_insert_rowid()
        );
        Ok(())
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    action: String,
    record_type: String,
    record_id: Option<i64>,
    level: String,
    metadata: String,
    created_at: String,
}

impl ActivityRow {
    fn into_record(self) -> Option<ActivityRecord> {
        let action = ActivityAction::parse(&self.action)?;
        let Some(created_at) = parse_timestamp(&self.created_at) else {
            warn!("Activity #{} has an unreadable timestamp, ignoring", self.id);
            return None;
        };
        let subject = match (self.record_type.as_str(), self.record_id) {
            ("Contest", Some(id)) => ActivitySubject::Contest(id),
            _ => ActivitySubject::System,
        };

        Some(ActivityRecord {
            id: Some(self.id),
            action,
            subject,
            level: ActivityLevel::parse(&self.level),
            metadata: serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null),
            created_at,
        })
    }
}
