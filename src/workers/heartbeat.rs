use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::time;
use tracing::{error, info, warn};

use crate::db::ActivitySink;
use crate::models::{ActivityAction, ActivityLevel, ActivityRecord, ActivitySubject};

/// Minimum gap between two `queue_stalled` entries
const ALERT_EVERY_MINS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Healthy,
    Stalled { last_beat: Option<DateTime<Utc>> },
}

/// Tracks that the background sweep is still running
pub struct QueueHeartbeat {
    activity: Arc<dyn ActivitySink>,
    stale_after: chrono::Duration,
    started_at: DateTime<Utc>,
    last_beat: Mutex<Option<DateTime<Utc>>>,
    last_alert: Mutex<Option<DateTime<Utc>>>,
}

impl QueueHeartbeat {
    pub fn new(activity: Arc<dyn ActivitySink>, stale_after_secs: u64) -> Self {
        Self::starting_at(activity, stale_after_secs, Utc::now())
    }

    fn starting_at(activity: Arc<dyn ActivitySink>, stale_after_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            activity,
            stale_after: chrono::Duration::seconds(stale_after_secs as i64),
            started_at: now,
            last_beat: Mutex::new(None),
            last_alert: Mutex::new(None),
        }
    }

    pub fn beat(&self) {
        self.beat_at(Utc::now());
    }

    pub fn beat_at(&self, now: DateTime<Utc>) {
        *self.last_beat.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
    }

    pub fn last_beat(&self) -> Option<DateTime<Utc>> {
        *self.last_beat.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stalled once nothing has beaten for longer than the threshold.
    /// A fresh heartbeat gets the threshold as grace from start.
    pub fn status(&self, now: DateTime<Utc>) -> HeartbeatStatus {
        let last_beat = self.last_beat();
        let reference = last_beat.unwrap_or(self.started_at);

        if now - reference > self.stale_after {
            HeartbeatStatus::Stalled { last_beat }
        } else {
            HeartbeatStatus::Healthy
        }
    }

    /// Evaluate the heartbeat and audit a stall, at most once per alert window
    pub async fn check(&self, now: DateTime<Utc>) -> HeartbeatStatus {
        let status = self.status(now);

        let HeartbeatStatus::Stalled { last_beat } = status else {
            return status;
        };

        {
            let mut last_alert = self.last_alert.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(at) = *last_alert {
                if now - at < chrono::Duration::minutes(ALERT_EVERY_MINS) {
                    return status;
                }
            }
            *last_alert = Some(now);
        }

        warn!("Refresh queue stalled (last heartbeat: {:?})", last_beat);

        let record = ActivityRecord::new(
            ActivityAction::QueueStalled,
            ActivitySubject::System,
            ActivityLevel::Warning,
            json!({
                "last_beat": last_beat.map(|t| t.to_rfc3339()),
                "stale_after_secs": self.stale_after.num_seconds(),
            }),
        );
        if let Err(e) = self.activity.record(record).await {
            error!("Failed to write queue_stalled activity: {}", e);
        }

        status
    }

    /// Watchdog loop
    pub async fn run(self: Arc<Self>, check_interval: Duration) {
        info!("Queue heartbeat watchdog started (interval: {:?})", check_interval);

        let mut interval = time::interval(check_interval);
        loop {
            interval.tick().await;
            self.check(Utc::now()).await;
        }
    }
}
