use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::api::{ScoreRequest, ScoreSources};
use crate::db::{ActivitySink, ContestStore};
use crate::error::{LocatorError, RefreshError, ScrapeError, SettlementError};
use crate::models::{
    ActivityAction, ActivityLevel, ActivityRecord, ActivitySubject, Contest, ContestStatus,
    SettlementKind,
};
use crate::normalize::normalize;
use crate::settlement::SettlementEngine;

use super::RetryPolicy;

/// Why a refresh did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Completed,
    NotStarted,
    NoLocator,
    InvalidLocator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Skipped(SkipReason),
    Settled { is_final: bool, source: &'static str },
}

impl RefreshOutcome {
    pub fn is_final(&self) -> bool {
        matches!(self, RefreshOutcome::Settled { is_final: true, .. })
    }
}

/// Fetch, normalize and settle one contest
pub struct ContestRefresher {
    contests: ContestStore,
    sources: ScoreSources,
    engine: Arc<SettlementEngine>,
    activity: Arc<dyn ActivitySink>,
    retry: RetryPolicy,
}

impl ContestRefresher {
    pub fn new(
        contests: ContestStore,
        sources: ScoreSources,
        engine: Arc<SettlementEngine>,
        activity: Arc<dyn ActivitySink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            contests,
            sources,
            engine,
            activity,
            retry,
        }
    }

    /// Refresh a contest's scores. Completed contests are never fetched again.
    pub async fn refresh(&self, contest_id: i64) -> Result<RefreshOutcome, RefreshError> {
        let Some(contest) = self.contests.get_contest(contest_id).await? else {
            warn!("Contest {} not found, skipping refresh", contest_id);
            return Ok(RefreshOutcome::Skipped(SkipReason::NotFound));
        };

        if contest.is_completed() {
            debug!("Contest {} already completed", contest_id);
            return Ok(RefreshOutcome::Skipped(SkipReason::Completed));
        }

        if !contest.has_started(Utc::now()) {
            debug!("Contest {} has not started yet", contest_id);
            return Ok(RefreshOutcome::Skipped(SkipReason::NotStarted));
        }

        let request = match ScoreRequest::for_contest(&contest) {
            None => {
                debug!("Contest {} has no score URL", contest_id);
                return Ok(RefreshOutcome::Skipped(SkipReason::NoLocator));
            }
            Some(Err(LocatorError::Invalid(url))) => {
                debug!("Contest {} has an unusable score URL: {}", contest_id, url);
                return Ok(RefreshOutcome::Skipped(SkipReason::InvalidLocator));
            }
            Some(Err(e)) => {
                let err = ScrapeError::from(e);
                self.report_scrape_error(&contest, &err).await;
                return Err(err.into());
            }
            Some(Ok(request)) => request,
        };

        if contest.status == ContestStatus::Upcoming
            && self
                .contests
                .advance_status(contest_id, ContestStatus::InProgress)
                .await?
        {
            info!("Contest {} is now in progress", contest_id);
        }

        let fetched = match self.fetch(&request).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.report_scrape_error(&contest, &e).await;
                return Err(e.into());
            }
        };

        let canonical = match normalize(&fetched.raw, contest.league.periods) {
            Ok(canonical) => canonical,
            Err(e) => {
                self.report_scrape_error(&contest, &e).await;
                return Err(e.into());
            }
        };

        let kind = SettlementKind::Automated {
            source: fetched.source.to_string(),
            score_url: request.locator.as_str().to_string(),
        };
        let is_final = match self.engine.settle(&contest, &canonical, kind).await {
            Ok(is_final) => is_final,
            Err(SettlementError::AlreadyCompleted(_)) => {
                return Ok(RefreshOutcome::Skipped(SkipReason::Completed));
            }
            Err(e) => return Err(e.into()),
        };

        if is_final
            && self
                .contests
                .advance_status(contest_id, ContestStatus::Completed)
                .await?
        {
            info!("Contest {} is final", contest_id);
        }

        Ok(RefreshOutcome::Settled {
            is_final,
            source: fetched.source,
        })
    }

    async fn fetch(&self, request: &ScoreRequest) -> Result<crate::api::Fetched, ScrapeError> {
        let sources = &self.sources;
        self.retry
            .run(request.locator.as_str(), move || sources.fetch(request))
            .await
    }

    /// Audit a failed fetch; the pre-game condition is expected and stays silent
    async fn report_scrape_error(&self, contest: &Contest, err: &ScrapeError) {
        if err.is_pre_game() {
            debug!("Contest {} has no linescore yet", contest.id);
            return;
        }

        warn!("Scrape failed for contest {}: {}", contest.id, err);

        let record = ActivityRecord::new(
            ActivityAction::ScrapeError,
            ActivitySubject::Contest(contest.id),
            ActivityLevel::Error,
            json!({
                "error_class": err.kind(),
                "message": err.to_string(),
                "score_url": contest.score_url,
            }),
        );

        if let Err(e) = self.activity.record(record).await {
            error!("Failed to write scrape_error activity: {}", e);
        }
    }
}
