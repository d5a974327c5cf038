use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Audited action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    /// Scores written from a scraped linescore
    ScoreUpdateAutomated,
    /// Scores written from an operator correction
    ScoreUpdateManual,
    /// A settlement run failed and nothing was written
    TransactionRollback,
    /// Fetching or parsing an upstream source failed
    ScrapeError,
    /// The background sweep stopped beating
    QueueStalled,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::ScoreUpdateAutomated => "score_update_automated",
            ActivityAction::ScoreUpdateManual => "score_update_manual",
            ActivityAction::TransactionRollback => "transaction_rollback",
            ActivityAction::ScrapeError => "scrape_error",
            ActivityAction::QueueStalled => "queue_stalled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "score_update_automated" => Some(ActivityAction::ScoreUpdateAutomated),
            "score_update_manual" => Some(ActivityAction::ScoreUpdateManual),
            "transaction_rollback" => Some(ActivityAction::TransactionRollback),
            "scrape_error" => Some(ActivityAction::ScrapeError),
            "queue_stalled" => Some(ActivityAction::QueueStalled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Info => "info",
            ActivityLevel::Warning => "warning",
            ActivityLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warning" => ActivityLevel::Warning,
            "error" => ActivityLevel::Error,
            _ => ActivityLevel::Info,
        }
    }
}

/// What an activity entry is about
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ActivitySubject {
    Contest(i64),
    System,
}

impl ActivitySubject {
    pub fn record_type(&self) -> &'static str {
        match self {
            ActivitySubject::Contest(_) => "Contest",
            ActivitySubject::System => "System",
        }
    }

    pub fn record_id(&self) -> Option<i64> {
        match self {
            ActivitySubject::Contest(id) => Some(*id),
            ActivitySubject::System => None,
        }
    }
}

/// Structured audit entry handed to the activity log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Option<i64>,
    pub action: ActivityAction,
    pub subject: ActivitySubject,
    pub level: ActivityLevel,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        action: ActivityAction,
        subject: ActivitySubject,
        level: ActivityLevel,
        metadata: Value,
    ) -> Self {
        Self {
            id: None,
            action,
            subject,
            level,
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == ActivityLevel::Error
    }
}
