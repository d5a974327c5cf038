use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::db::ContestStore;

use super::{QueueHeartbeat, RefreshScheduler};

/// Worker that periodically refreshes every contest that is live or past kickoff
pub struct ActiveContestSweeper {
    contests: ContestStore,
    scheduler: Arc<RefreshScheduler>,
    heartbeat: Arc<QueueHeartbeat>,
    sweep_interval: Duration,
}

impl ActiveContestSweeper {
    pub fn new(
        contests: ContestStore,
        scheduler: Arc<RefreshScheduler>,
        heartbeat: Arc<QueueHeartbeat>,
        sweep_interval_secs: u64,
    ) -> Self {
        Self {
            contests,
            scheduler,
            heartbeat,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        }
    }

    /// Run the worker loop
    pub async fn run(&self) {
        info!(
            "Active contest sweeper started (interval: {:?})",
            self.sweep_interval
        );

        let mut interval = time::interval(self.sweep_interval);

        loop {
            interval.tick().await;
            self.sweep().await;
        }
    }

    /// Dispatch a refresh for each refreshable contest; returns how many started
    pub async fn sweep(&self) -> usize {
        self.heartbeat.beat();

        let ids = match self.contests.refreshable_contest_ids(Utc::now()).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to load active contests: {}", e);
                warn!("Will retry on next interval");
                return 0;
            }
        };

        let dispatched = ids
            .iter()
            .filter(|&&id| self.scheduler.dispatch(id))
            .count();

        if !ids.is_empty() {
            debug!(
                "Sweep complete: {} active, {} dispatched",
                ids.len(),
                dispatched
            );
        }
        dispatched
    }
}
