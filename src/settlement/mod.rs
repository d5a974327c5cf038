pub mod plan;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::db::{ActivitySink, ContestStore, ScoreStore};
use crate::error::SettlementError;
use crate::grid::GridAssignment;
use crate::models::{
    ActivityAction, ActivityLevel, ActivityRecord, ActivitySubject, CanonicalScore, Contest,
    ContestStatus, ManualScores, PeriodChange, SettlementKind, UNPLAYED,
};

pub use plan::plan_periods;

/// Writes period settlements for contests and audits every run.
///
/// Runs for the same contest are serialized; different contests never wait on
/// each other.
pub struct SettlementEngine {
    contests: ContestStore,
    scores: ScoreStore,
    activity: Arc<dyn ActivitySink>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SettlementEngine {
    pub fn new(contests: ContestStore, scores: ScoreStore, activity: Arc<dyn ActivitySink>) -> Self {
        Self {
            contests,
            scores,
            activity,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Settle a scraped score. Returns whether upstream marked the contest final.
    ///
    /// An all-zero score is how the structured API looks before kickoff and is
    /// not treated as an update.
    pub async fn settle(
        &self,
        contest: &Contest,
        score: &CanonicalScore,
        kind: SettlementKind,
    ) -> Result<bool, SettlementError> {
        if score.is_blank() {
            debug!("Contest {} has a blank linescore, nothing to settle", contest.id);
            return Ok(score.is_final);
        }

        self.run(contest, score, kind).await
    }

    /// Apply operator-supplied scores through the same settlement path.
    ///
    /// Validation failures are returned before anything is written.
    pub async fn settle_manual(
        &self,
        contest_id: i64,
        manual: ManualScores,
    ) -> Result<bool, SettlementError> {
        let contest = self
            .contests
            .get_contest(contest_id)
            .await?
            .ok_or(SettlementError::ContestNotFound(contest_id))?;

        let score = validate_manual(&contest, &manual)?;
        let kind = SettlementKind::Manual {
            reason: manual.reason.trim().to_string(),
        };

        self.run(&contest, &score, kind).await
    }

    async fn run(
        &self,
        contest: &Contest,
        score: &CanonicalScore,
        kind: SettlementKind,
    ) -> Result<bool, SettlementError> {
        let lock = self.lock_for(contest.id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(contest, score, &kind).await
        };
        self.release(contest.id, lock).await;

        result
    }

    /// Everything here runs while the contest's lock is held
    async fn run_locked(
        &self,
        contest: &Contest,
        score: &CanonicalScore,
        kind: &SettlementKind,
    ) -> Result<bool, SettlementError> {
        // The caller's snapshot may predate a correction that completed the contest
        let current = self
            .contests
            .get_contest(contest.id)
            .await?
            .ok_or(SettlementError::ContestNotFound(contest.id))?;

        if current.is_completed() && matches!(kind, SettlementKind::Automated { .. }) {
            info!(
                "Contest {} completed while its score was being fetched, discarding",
                contest.id
            );
            return Err(SettlementError::AlreadyCompleted(contest.id));
        }

        let changes = match self.apply(&current, score).await {
            Ok(changes) => changes,
            Err(e) => {
                error!("Settlement for contest {} rolled back: {}", contest.id, e);
                self.audit_rollback(contest, kind, &e).await;
                return Err(e);
            }
        };

        self.audit_success(contest, score, kind, &changes).await;

        if let SettlementKind::Manual { .. } = kind {
            if score.is_final
                && self
                    .contests
                    .advance_status(contest.id, ContestStatus::Completed)
                    .await?
            {
                info!("Contest {} marked final by operator", contest.id);
            }
        }

        Ok(score.is_final)
    }

    async fn apply(
        &self,
        contest: &Contest,
        score: &CanonicalScore,
    ) -> Result<Vec<PeriodChange>, SettlementError> {
        let serialized = contest
            .grid
            .as_deref()
            .ok_or(SettlementError::MissingGrid(contest.id))?;
        let grid = GridAssignment::parse(serialized)?;

        let planned = plan_periods(contest, &grid, score)?;
        let changes = self.scores.replace_periods(contest.id, &planned).await?;

        Ok(changes)
    }

    async fn lock_for(&self, contest_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(contest_id).or_default().clone()
    }

    /// Drop the contest's lock entry once nobody else holds or waits on it
    async fn release(&self, contest_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&contest_id);
        }
    }

    async fn audit_success(
        &self,
        contest: &Contest,
        score: &CanonicalScore,
        kind: &SettlementKind,
        changes: &[PeriodChange],
    ) {
        let changed: Vec<&PeriodChange> = changes.iter().filter(|c| !c.is_unchanged()).collect();

        let action = match kind {
            SettlementKind::Automated { .. } => {
                // Repeated polls of an unchanged linescore are not worth an entry
                if changed.is_empty() {
                    debug!("Contest {} linescore unchanged", contest.id);
                    return;
                }
                ActivityAction::ScoreUpdateAutomated
            }
            SettlementKind::Manual { .. } => ActivityAction::ScoreUpdateManual,
        };

        info!(
            "Contest {} settled: {} period(s) written, {} changed{}",
            contest.id,
            changes.len(),
            changed.len(),
            if score.is_final { ", final" } else { "" }
        );

        let mut metadata = kind_metadata(kind);
        metadata["periods_updated"] = json!(changed);
        metadata["final"] = json!(score.is_final);
        metadata["overtime"] = json!(score.overtime);

        self.write_audit(ActivityRecord::new(
            action,
            ActivitySubject::Contest(contest.id),
            ActivityLevel::Info,
            metadata,
        ))
        .await;
    }

    async fn audit_rollback(&self, contest: &Contest, kind: &SettlementKind, err: &SettlementError) {
        let metadata = json!({
            "error_class": err.kind(),
            "message": err.to_string(),
            "context": kind_metadata(kind),
        });

        self.write_audit(ActivityRecord::new(
            ActivityAction::TransactionRollback,
            ActivitySubject::Contest(contest.id),
            ActivityLevel::Error,
            metadata,
        ))
        .await;
    }

    /// The audit trail never decides the outcome of a settlement
    async fn write_audit(&self, record: ActivityRecord) {
        let action = record.action;
        if let Err(e) = self.activity.record(record).await {
            error!("Failed to write {} activity: {}", action.as_str(), e);
        }
    }
}

fn kind_metadata(kind: &SettlementKind) -> Value {
    match kind {
        SettlementKind::Automated { source, score_url } => json!({
            "kind": "automated",
            "source": source,
            "score_url": score_url,
        }),
        SettlementKind::Manual { reason } => json!({
            "kind": "manual",
            "reason": reason,
        }),
    }
}

fn validate_manual(contest: &Contest, manual: &ManualScores) -> Result<CanonicalScore, SettlementError> {
    if manual.reason.trim().is_empty() {
        return Err(SettlementError::Validation(
            "a reason is required for manual scores".to_string(),
        ));
    }

    if manual.away.len() != manual.home.len() {
        return Err(SettlementError::Validation(format!(
            "away has {} periods but home has {}",
            manual.away.len(),
            manual.home.len()
        )));
    }

    let periods = contest.league.periods as usize;
    if manual.away.len() > periods {
        return Err(SettlementError::Validation(format!(
            "{} periods given, league plays {}",
            manual.away.len(),
            periods
        )));
    }

    let negative = manual
        .away
        .iter()
        .chain(manual.home.iter())
        .flatten()
        .any(|&s| s < 0);
    if negative {
        return Err(SettlementError::Validation(
            "scores cannot be negative".to_string(),
        ));
    }

    let side = |scores: &[Option<i32>]| -> Vec<i32> {
        scores.iter().map(|s| s.unwrap_or(UNPLAYED)).collect()
    };

    Ok(CanonicalScore {
        away: side(&manual.away),
        home: side(&manual.home),
        overtime: manual.overtime,
        is_final: manual.mark_final,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewContest, RawLinescore};
    use crate::normalize::normalize;
    use crate::testing::{fixture, Fixture, ESPN_URL};
    use chrono::Utc;

    fn engine(fx: &Fixture) -> SettlementEngine {
        SettlementEngine::new(fx.contests.clone(), fx.scores.clone(), fx.activity.clone())
    }

    fn automated() -> SettlementKind {
        SettlementKind::Automated {
            source: "espn_api".to_string(),
            score_url: ESPN_URL.to_string(),
        }
    }

    fn canonical(away: Vec<i32>, home: Vec<i32>, is_final: bool) -> CanonicalScore {
        CanonicalScore {
            away,
            home,
            overtime: false,
            is_final,
        }
    }

    async fn contest(fx: &Fixture, id: i64) -> Contest {
        fx.contests.get_contest(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_halves_league_scenario() {
        let fx = fixture().await;
        let engine = engine(&fx);
        let c = contest(&fx, fx.contest_id).await;

        let is_final = engine
            .settle(&c, &canonical(vec![7, 7, 0, 3], vec![0, 7, 3, 0], true), automated())
            .await
            .unwrap();
        assert!(is_final);

        let rows = fx.scores.for_contest(fx.contest_id).await.unwrap();
        assert_eq!(rows.len(), 4);

        let non_scoring: Vec<u32> = rows.iter().filter(|r| r.non_scoring).map(|r| r.period).collect();
        assert_eq!(non_scoring, vec![1, 3]);

        let prizes: Vec<i64> = rows.iter().map(|r| r.prize).collect();
        assert_eq!(prizes, vec![25, 25, 25, 100]);

        let totals: Vec<(i32, i32)> = rows.iter().map(|r| (r.away_total, r.home_total)).collect();
        assert_eq!(totals, vec![(7, 0), (14, 7), (14, 10), (17, 10)]);

        for row in &rows {
            assert_eq!(Some(row.winner_id), fx.grid.resolve(row.away_total, row.home_total));
        }
    }

    #[tokio::test]
    async fn test_sentinel_periods_are_not_written() {
        let fx = fixture().await;
        let engine = engine(&fx);
        let c = contest(&fx, fx.contest_id).await;

        let raw = RawLinescore::new(vec![7, 7, 3, -1], vec![0, 7, -1, -1], false);
        let score = normalize(&raw, 4).unwrap();

        let is_final = engine.settle(&c, &score, automated()).await.unwrap();
        assert!(!is_final);

        let periods: Vec<u32> = fx
            .scores
            .for_contest(fx.contest_id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.period)
            .collect();
        assert_eq!(periods, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let fx = fixture().await;
        let engine = engine(&fx);
        let c = contest(&fx, fx.contest_id).await;
        let score = canonical(vec![3, 10], vec![7, 0], false);

        engine.settle(&c, &score, automated()).await.unwrap();
        let first = fx.scores.for_contest(fx.contest_id).await.unwrap();

        engine.settle(&c, &score, automated()).await.unwrap();
        let second = fx.scores.for_contest(fx.contest_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);

        // Only the run that changed something is audited
        let log = fx.activity.for_contest(fx.contest_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, ActivityAction::ScoreUpdateAutomated);
        assert_eq!(log[0].metadata["source"], "espn_api");
        assert_eq!(log[0].metadata["periods_updated"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_score_is_skipped() {
        let fx = fixture().await;
        let engine = engine(&fx);
        let c = contest(&fx, fx.contest_id).await;

        let is_final = engine
            .settle(&c, &canonical(vec![0, 0, 0, 0], vec![0, 0, 0, 0], false), automated())
            .await
            .unwrap();

        assert!(!is_final);
        assert!(fx.scores.for_contest(fx.contest_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grid_miss_rolls_back_and_is_audited() {
        let fx = fixture().await;
        let engine = engine(&fx);

        let owner = fx.grid.resolve(0, 0).unwrap();
        let id = fx
            .contests
            .insert_contest(&NewContest {
                title: None,
                league_id: fx.league_id,
                starts_at: Utc::now(),
                timezone: "UTC".to_string(),
                period_prize: 25,
                final_prize: 100,
                score_url: None,
                grid: Some(format!("a0h0:{}", owner)),
            })
            .await
            .unwrap();
        let c = contest(&fx, id).await;

        let result = engine
            .settle(&c, &canonical(vec![10, 3], vec![0, 0], false), automated())
            .await;
        assert!(matches!(result, Err(SettlementError::GridMiss(_))));
        assert!(fx.scores.for_contest(id).await.unwrap().is_empty());

        let log = fx.activity.for_contest(id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, ActivityAction::TransactionRollback);
        assert!(log[0].is_error());
        assert_eq!(log[0].metadata["error_class"], "grid_miss");
    }

    #[tokio::test]
    async fn test_missing_grid_is_reported() {
        let fx = fixture().await;
        let engine = engine(&fx);
        let id = crate::testing::seed_contest(&fx, Utc::now(), None).await;
        let c = contest(&fx, id).await;

        let result = engine
            .settle(&c, &canonical(vec![3], vec![0], false), automated())
            .await;
        assert!(matches!(result, Err(SettlementError::MissingGrid(_))));
    }

    #[tokio::test]
    async fn test_manual_scores_require_reason_and_shape() {
        let fx = fixture().await;
        let engine = engine(&fx);

        let no_reason = ManualScores {
            away: vec![Some(7)],
            home: vec![Some(0)],
            ..Default::default()
        };
        assert!(matches!(
            engine.settle_manual(fx.contest_id, no_reason).await,
            Err(SettlementError::Validation(_))
        ));

        let lopsided = ManualScores {
            away: vec![Some(7), Some(3)],
            home: vec![Some(0)],
            reason: "box score correction".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            engine.settle_manual(fx.contest_id, lopsided).await,
            Err(SettlementError::Validation(_))
        ));

        let too_long = ManualScores {
            away: vec![Some(0); 5],
            home: vec![Some(0); 5],
            reason: "box score correction".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            engine.settle_manual(fx.contest_id, too_long).await,
            Err(SettlementError::Validation(_))
        ));

        assert!(matches!(
            engine.settle_manual(9_999, ManualScores::default()).await,
            Err(SettlementError::ContestNotFound(9_999))
        ));

        assert!(fx.scores.for_contest(fx.contest_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_final_completes_contest() {
        let fx = fixture().await;
        let engine = engine(&fx);

        let manual = ManualScores {
            away: vec![Some(0), Some(0), Some(7), Some(6)],
            home: vec![Some(3), Some(0), Some(0), Some(7)],
            mark_final: true,
            overtime: true,
            reason: "stat crew fixed Q4".to_string(),
        };

        let is_final = engine.settle_manual(fx.contest_id, manual).await.unwrap();
        assert!(is_final);

        let c = contest(&fx, fx.contest_id).await;
        assert_eq!(c.status, ContestStatus::Completed);

        let rows = fx.scores.for_contest(fx.contest_id).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[3].overtime);
        // 0-0 periods are real scores in a correction
        assert_eq!((rows[1].away_total, rows[1].home_total), (0, 3));

        let log = fx.activity.for_contest(fx.contest_id).await.unwrap();
        assert_eq!(log[0].action, ActivityAction::ScoreUpdateManual);
        assert_eq!(log[0].metadata["reason"], "stat crew fixed Q4");
        assert_eq!(log[0].metadata["final"], true);
    }

    #[tokio::test]
    async fn test_manual_unplayed_periods_are_skipped() {
        let fx = fixture().await;
        let engine = engine(&fx);

        let manual = ManualScores {
            away: vec![Some(7), None],
            home: vec![Some(3), None],
            reason: "first quarter only".to_string(),
            ..Default::default()
        };

        assert!(!engine.settle_manual(fx.contest_id, manual).await.unwrap());
        assert_eq!(fx.scores.for_contest(fx.contest_id).await.unwrap().len(), 1);

        let c = contest(&fx, fx.contest_id).await;
        assert_eq!(c.status, ContestStatus::Upcoming);
    }

    #[tokio::test]
    async fn test_completed_contest_refuses_automated_scores() {
        let fx = fixture().await;
        let engine = engine(&fx);
        let snapshot = contest(&fx, fx.contest_id).await;

        let correction = ManualScores {
            away: vec![Some(7); 4],
            home: vec![Some(0); 4],
            mark_final: true,
            reason: "official box score".to_string(),
            ..Default::default()
        };
        engine.settle_manual(fx.contest_id, correction).await.unwrap();

        // A fetch that started before the correction arrives with the stale snapshot
        let result = engine
            .settle(&snapshot, &canonical(vec![3, 3, 3, 3], vec![1, 1, 1, 1], false), automated())
            .await;
        assert!(matches!(result, Err(SettlementError::AlreadyCompleted(id)) if id == fx.contest_id));

        let rows = fx.scores.for_contest(fx.contest_id).await.unwrap();
        assert_eq!((rows[3].away_total, rows[3].home_total), (28, 0));

        // Operators can still correct a completed contest
        let recount = ManualScores {
            away: vec![Some(7), Some(7), Some(7), Some(6)],
            home: vec![Some(0); 4],
            mark_final: true,
            reason: "missed extra point".to_string(),
            ..Default::default()
        };
        engine.settle_manual(fx.contest_id, recount).await.unwrap();
        let rows = fx.scores.for_contest(fx.contest_id).await.unwrap();
        assert_eq!((rows[3].away_total, rows[3].home_total), (27, 0));
    }

    #[tokio::test]
    async fn test_contest_locks_are_released_after_runs() {
        let fx = fixture().await;
        let engine = Arc::new(engine(&fx));
        let c = contest(&fx, fx.contest_id).await;

        let runs: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let c = c.clone();
                tokio::spawn(async move {
                    engine
                        .settle(&c, &canonical(vec![i + 1], vec![0], false), automated())
                        .await
                })
            })
            .collect();
        for run in runs {
            run.await.unwrap().unwrap();
        }

        assert!(engine.locks.lock().await.is_empty());

        let no_grid = crate::testing::seed_contest(&fx, Utc::now(), None).await;
        let failed = engine
            .settle(&contest(&fx, no_grid).await, &canonical(vec![3], vec![0], false), automated())
            .await;
        assert!(failed.is_err());
        assert!(engine.locks.lock().await.is_empty());
    }
}
