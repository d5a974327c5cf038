use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::ContestStore;
use crate::error::{RefreshError, ScheduleError};
use crate::models::start_instant;

use super::{ContestRefresher, RefreshOutcome};

struct PendingRefresh {
    token: u64,
    at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Contests with a refresh currently running
#[derive(Default)]
struct InFlight {
    contests: Mutex<HashSet<i64>>,
}

impl InFlight {
    fn acquire(self: &Arc<Self>, contest_id: i64) -> Option<InFlightGuard> {
        let mut contests = self.contests.lock().unwrap_or_else(|e| e.into_inner());
        contests.insert(contest_id).then(|| InFlightGuard {
            owner: Arc::clone(self),
            contest_id,
        })
    }

    fn contains(&self, contest_id: i64) -> bool {
        self.contests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&contest_id)
    }
}

struct InFlightGuard {
    owner: Arc<InFlight>,
    contest_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner
            .contests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.contest_id);
    }
}

/// One-shot refreshes at kickoff plus at most one in-flight refresh per contest
pub struct RefreshScheduler {
    refresher: Arc<ContestRefresher>,
    contests: ContestStore,
    pending: Mutex<HashMap<i64, PendingRefresh>>,
    in_flight: Arc<InFlight>,
    next_token: AtomicU64,
}

impl RefreshScheduler {
    pub fn new(refresher: Arc<ContestRefresher>, contests: ContestStore) -> Arc<Self> {
        Arc::new(Self {
            refresher,
            contests,
            pending: Mutex::new(HashMap::new()),
            in_flight: Arc::new(InFlight::default()),
            next_token: AtomicU64::new(1),
        })
    }

    /// Queue a refresh for `at`, replacing any refresh already queued for the contest
    pub fn schedule_at(self: &Arc<Self>, contest_id: i64, at: DateTime<Utc>) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let delay = (at - Utc::now()).to_std().unwrap_or_default();

        // Held across the spawn so a zero delay cannot race the insert below
        let mut pending = self.lock_pending();

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Leave the queue first; from here on the run can no longer be cancelled
            if !scheduler.take_pending(contest_id, token) {
                return;
            }
            scheduler.run_now(contest_id).await;
        });

        if let Some(previous) = pending.insert(contest_id, PendingRefresh { token, at, handle }) {
            previous.handle.abort();
            debug!("Replaced queued refresh for contest {}", contest_id);
        }
        debug!("Refresh for contest {} queued at {}", contest_id, at);
    }

    /// Drop a queued refresh. A refresh that already started is left alone.
    pub fn cancel(&self, contest_id: i64) -> bool {
        match self.lock_pending().remove(&contest_id) {
            Some(previous) => {
                previous.handle.abort();
                debug!("Cancelled queued refresh for contest {}", contest_id);
                true
            }
            None => false,
        }
    }

    pub fn scheduled_at(&self, contest_id: i64) -> Option<DateTime<Utc>> {
        self.lock_pending().get(&contest_id).map(|p| p.at)
    }

    pub fn is_running(&self, contest_id: i64) -> bool {
        self.in_flight.contains(contest_id)
    }

    /// Move a contest's kickoff and requeue its refresh at the new instant
    pub async fn reschedule(
        self: &Arc<Self>,
        contest_id: i64,
        date: NaiveDate,
        time: NaiveTime,
        timezone: &str,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let starts_at = start_instant(date, time, timezone)?;

        self.cancel(contest_id);

        if !self
            .contests
            .update_start(contest_id, starts_at, timezone)
            .await?
        {
            return Err(ScheduleError::NotUpcoming(contest_id));
        }

        self.schedule_at(contest_id, starts_at);
        info!("Contest {} rescheduled to {}", contest_id, starts_at);
        Ok(starts_at)
    }

    /// Queue the kickoff refresh of every upcoming contest
    pub async fn schedule_upcoming(self: &Arc<Self>) -> Result<usize, sqlx::Error> {
        let upcoming = self.contests.upcoming_starts().await?;
        for (contest_id, starts_at) in &upcoming {
            self.schedule_at(*contest_id, *starts_at);
        }
        Ok(upcoming.len())
    }

    /// Run a refresh in the background unless one is already running.
    ///
    /// Returns whether a refresh was started.
    pub fn dispatch(self: &Arc<Self>, contest_id: i64) -> bool {
        let Some(guard) = self.in_flight.acquire(contest_id) else {
            debug!("Refresh for contest {} already running", contest_id);
            return false;
        };

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            scheduler.execute(contest_id).await;
        });
        true
    }

    /// Refresh now and wait for the result; `None` if one is already running
    pub async fn run_now(
        &self,
        contest_id: i64,
    ) -> Option<Result<RefreshOutcome, RefreshError>> {
        let Some(_guard) = self.in_flight.acquire(contest_id) else {
            debug!("Refresh for contest {} already running", contest_id);
            return None;
        };

        Some(self.execute(contest_id).await)
    }

    async fn execute(&self, contest_id: i64) -> Result<RefreshOutcome, RefreshError> {
        let result = self.refresher.refresh(contest_id).await;

        match &result {
            Ok(RefreshOutcome::Settled { is_final, source }) => {
                debug!(
                    "Contest {} refreshed from {} (final: {})",
                    contest_id, source, is_final
                );
            }
            Ok(RefreshOutcome::Skipped(reason)) => {
                debug!("Contest {} refresh skipped: {:?}", contest_id, reason);
            }
            Err(e) if e.is_pre_game() => {}
            Err(e) => {
                warn!("Refresh for contest {} failed: {}", contest_id, e);
            }
        }

        result
    }

    fn take_pending(&self, contest_id: i64, token: u64) -> bool {
        let mut pending = self.lock_pending();
        match pending.get(&contest_id) {
            Some(p) if p.token == token => {
                pending.remove(&contest_id);
                true
            }
            _ => false,
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<i64, PendingRefresh>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedSource;
    use crate::api::ScoreSources;
    use crate::error::{ScrapeError, StartTimeError};
    use crate::models::{ContestStatus, RawLinescore};
    use crate::settlement::SettlementEngine;
    use crate::testing::{fixture, Fixture};
    use crate::workers::RetryPolicy;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    async fn scheduler(
        script: Vec<Result<RawLinescore, ScrapeError>>,
    ) -> (Fixture, Arc<RefreshScheduler>, Arc<ScriptedSource>) {
        let fx = fixture().await;
        let api = ScriptedSource::new("espn_api", script);
        let sources = ScoreSources::from_parts(
            api.clone(),
            ScriptedSource::new("espn_html", vec![]),
            ScriptedSource::new("sports_reference", vec![]),
        );
        let engine = Arc::new(SettlementEngine::new(
            fx.contests.clone(),
            fx.scores.clone(),
            fx.activity.clone(),
        ));
        let refresher = Arc::new(ContestRefresher::new(
            fx.contests.clone(),
            sources,
            engine,
            fx.activity.clone(),
            RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        ));
        let scheduler = RefreshScheduler::new(refresher, fx.contests.clone());
        (fx, scheduler, api)
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    fn line() -> RawLinescore {
        RawLinescore::new(vec![7, -1, -1, -1], vec![3, -1, -1, -1], false)
    }

    #[tokio::test]
    async fn test_cancelled_refresh_never_runs() {
        let (fx, scheduler, api) = scheduler(vec![Ok(line())]).await;

        scheduler.schedule_at(fx.contest_id, Utc::now() + ChronoDuration::milliseconds(50));
        assert!(scheduler.scheduled_at(fx.contest_id).is_some());
        assert!(scheduler.cancel(fx.contest_id));
        assert!(!scheduler.cancel(fx.contest_id));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_due_refresh_runs_once() {
        let (fx, scheduler, api) = scheduler(vec![Ok(line())]).await;

        scheduler.schedule_at(fx.contest_id, Utc::now() - ChronoDuration::seconds(1));
        assert!(eventually(|| api.calls() == 1).await);
        assert!(eventually(|| !scheduler.is_running(fx.contest_id)).await);
        assert!(scheduler.scheduled_at(fx.contest_id).is_none());

        let status = fx.contests.get_contest(fx.contest_id).await.unwrap().unwrap().status;
        assert_eq!(status, ContestStatus::InProgress);
    }

    #[tokio::test]
    async fn test_rescheduling_replaces_queued_refresh() {
        let (fx, scheduler, api) = scheduler(vec![Ok(line()), Ok(line())]).await;

        scheduler.schedule_at(fx.contest_id, Utc::now() + ChronoDuration::hours(6));

        let date = NaiveDate::from_ymd_opt(2030, 9, 7).unwrap();
        let time = NaiveTime::from_hms_opt(19, 30, 0).unwrap();
        let starts_at = scheduler
            .reschedule(fx.contest_id, date, time, "America/Chicago")
            .await
            .unwrap();

        assert_eq!(starts_at.to_rfc3339(), "2030-09-08T00:30:00+00:00");
        assert_eq!(scheduler.scheduled_at(fx.contest_id), Some(starts_at));

        let contest = fx.contests.get_contest(fx.contest_id).await.unwrap().unwrap();
        assert_eq!(contest.starts_at, starts_at);
        assert_eq!(contest.timezone, "America/Chicago");
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_reschedule_keeps_queued_refresh() {
        let (fx, scheduler, _api) = scheduler(vec![]).await;
        let at = Utc::now() + ChronoDuration::hours(6);
        scheduler.schedule_at(fx.contest_id, at);

        let date = NaiveDate::from_ymd_opt(2030, 9, 7).unwrap();
        let time = NaiveTime::from_hms_opt(19, 30, 0).unwrap();
        let err = scheduler
            .reschedule(fx.contest_id, date, time, "Nowhere/Special")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScheduleError::StartTime(StartTimeError::UnknownZone(_))
        ));
        assert_eq!(scheduler.scheduled_at(fx.contest_id), Some(at));
    }

    #[tokio::test]
    async fn test_started_contest_cannot_be_rescheduled() {
        let (fx, scheduler, _api) = scheduler(vec![]).await;
        fx.contests
            .advance_status(fx.contest_id, ContestStatus::InProgress)
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2030, 9, 7).unwrap();
        let time = NaiveTime::from_hms_opt(19, 30, 0).unwrap();
        let err = scheduler
            .reschedule(fx.contest_id, date, time, "UTC")
            .await
            .unwrap_err();

        assert!(matches!(err, ScheduleError::NotUpcoming(_)));
        assert!(scheduler.scheduled_at(fx.contest_id).is_none());
    }

    #[tokio::test]
    async fn test_at_most_one_refresh_in_flight() {
        let (fx, scheduler, api) = scheduler(vec![Ok(line())]).await;

        let guard = scheduler.in_flight.acquire(fx.contest_id).unwrap();
        assert!(scheduler.is_running(fx.contest_id));
        assert!(!scheduler.dispatch(fx.contest_id));
        assert!(scheduler.run_now(fx.contest_id).await.is_none());
        assert_eq!(api.calls(), 0);

        drop(guard);
        assert!(!scheduler.is_running(fx.contest_id));

        let outcome = scheduler.run_now(fx.contest_id).await.unwrap().unwrap();
        assert!(!outcome.is_final());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_schedule_upcoming_queues_every_upcoming_contest() {
        let (fx, scheduler, _api) = scheduler(vec![Ok(line())]).await;
        let later = crate::testing::seed_contest(
            &fx,
            Utc::now() + ChronoDuration::hours(2),
            Some("https://www.espn.com/nfl/game/_/gameId/401547600"),
        )
        .await;
        let starts_at = fx.contests.get_contest(later).await.unwrap().unwrap().starts_at;

        let queued = scheduler.schedule_upcoming().await.unwrap();
        assert_eq!(queued, 2);
        assert_eq!(scheduler.scheduled_at(later), Some(starts_at));
    }
}
