use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};

use super::{parse_timestamp, timestamp};
use crate::models::{
    Contest, ContestStatus, League, NewContest, Participant, ParticipantKind, Sport,
};

/// SQLite store for contests, their leagues and the participant pool
#[derive(Clone)]
pub struct ContestStore {
    pool: Pool<Sqlite>,
}

const CONTEST_SELECT: &str = r#"
    SELECT
        c.id, c.title, c.starts_at, c.timezone, c.period_prize, c.final_prize,
        c.score_url, c.status, c.grid,
        l.id AS league_id, l.name AS league_name, l.sport, l.periods,
        l.quarters_score_as_halves, l.espn_slug
    FROM contests c
    JOIN leagues l ON l.id = c.league_id
"#;

impl ContestStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert a league; the `id` field is ignored
    pub async fn insert_league(&self, league: &League) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO leagues (name, sport, periods, quarters_score_as_halves, espn_slug)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&league.name)
        .bind(league.sport.as_str())
        .bind(league.periods as i64)
        .bind(league.quarters_score_as_halves)
        .bind(&league.espn_slug)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert a participant; the `id` field is ignored
    pub async fn insert_participant(&self, participant: &Participant) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO participants (name, display_name, kind, active, chances)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&participant.name)
        .bind(&participant.display_name)
        .bind(participant.kind.as_str())
        .bind(participant.active)
        .bind(participant.chances as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn insert_contest(&self, contest: &NewContest) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO contests (
                title, league_id, starts_at, timezone, period_prize, final_prize,
                score_url, status, grid, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&contest.title)
        .bind(contest.league_id)
        .bind(timestamp(contest.starts_at))
        .bind(&contest.timezone)
        .bind(contest.period_prize)
        .bind(contest.final_prize)
        .bind(&contest.score_url)
        .bind(ContestStatus::Upcoming.as_str())
        .bind(&contest.grid)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_contest(&self, id: i64) -> Result<Option<Contest>, sqlx::Error> {
        let row = sqlx::query_as::<_, ContestRow>(&format!("{} WHERE c.id = ?", CONTEST_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(ContestRow::into_contest))
    }

    /// Contests that should be polled now: in progress, or upcoming and past kickoff
    pub async fn refreshable_contest_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, sqlx::Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM contests
            WHERE score_url IS NOT NULL
              AND (status = 'in_progress' OR (status = 'upcoming' AND starts_at <= ?))
            ORDER BY starts_at ASC
            "#,
        )
        .bind(timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Upcoming contests with their kickoff instants
    pub async fn upcoming_starts(&self) -> Result<Vec<(i64, DateTime<Utc>)>, sqlx::Error> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, starts_at FROM contests
            WHERE status = 'upcoming' AND score_url IS NOT NULL
            ORDER BY starts_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, starts_at)| match parse_timestamp(&starts_at) {
                Some(at) => Some((id, at)),
                None => {
                    warn!("Contest {} has an unreadable start time {:?}, not scheduling", id, starts_at);
                    None
                }
            })
            .collect())
    }

    /// Move a contest forward in its lifecycle.
    ///
    /// Returns false when the contest is already at or past `next`.
    pub async fn advance_status(&self, id: i64, next: ContestStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE contests SET status = ?, updated_at = ?
            WHERE id = ?
              AND CASE status
                    WHEN 'upcoming' THEN 0
                    WHEN 'in_progress' THEN 1
                    ELSE 2
                  END < ?
            "#,
        )
        .bind(next.as_str())
        .bind(timestamp(Utc::now()))
        .bind(id)
        .bind(status_rank(next))
        .execute(&self.pool)
        .await?;

        let advanced = result.rows_affected() > 0;
        if advanced {
            debug!("Contest {} advanced to {}", id, next.as_str());
        }
        Ok(advanced)
    }

    /// Change the kickoff instant of a contest that has not started
    pub async fn update_start(
        &self,
        id: i64,
        starts_at: DateTime<Utc>,
        timezone: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE contests SET starts_at = ?, timezone = ?, updated_at = ?
            WHERE id = ? AND status = 'upcoming'
            "#,
        )
        .bind(timestamp(starts_at))
        .bind(timezone)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store a grid only if the contest has none yet
    pub async fn assign_grid(&self, id: i64, serialized: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE contests SET grid = ?, updated_at = ? WHERE id = ? AND grid IS NULL",
        )
        .bind(serialized)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Non-charity participants currently entered
    pub async fn active_participants(&self) -> Result<Vec<Participant>, sqlx::Error> {
        self.participants_where("active = 1 AND kind != 'charity'").await
    }

    /// Filler pool used to pad a short grid
    pub async fn charities(&self) -> Result<Vec<Participant>, sqlx::Error> {
        self.participants_where("kind = 'charity'").await
    }

    async fn participants_where(&self, filter: &str) -> Result<Vec<Participant>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT * FROM participants WHERE {} ORDER BY id",
            filter
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(ParticipantRow::into_participant).collect())
    }
}

fn status_rank(status: ContestStatus) -> i64 {
    match status {
        ContestStatus::Upcoming => 0,
        ContestStatus::InProgress => 1,
        ContestStatus::Completed => 2,
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct ContestRow {
    id: i64,
    title: Option<String>,
    starts_at: String,
    timezone: String,
    period_prize: i64,
    final_prize: i64,
    score_url: Option<String>,
    status: String,
    grid: Option<String>,
    league_id: i64,
    league_name: String,
    sport: String,
    periods: i64,
    quarters_score_as_halves: bool,
    espn_slug: Option<String>,
}

impl ContestRow {
    fn into_contest(self) -> Option<Contest> {
        let (Some(sport), Some(status)) = (Sport::parse(&self.sport), ContestStatus::parse(&self.status))
        else {
            warn!("Contest {} has an unknown sport or status, ignoring", self.id);
            return None;
        };

        let Some(starts_at) = parse_timestamp(&self.starts_at) else {
            warn!("Contest {} has an unreadable start time {:?}, ignoring", self.id, self.starts_at);
            return None;
        };

        Some(Contest {
            id: self.id,
            title: self.title,
            league: League {
                id: self.league_id,
                name: self.league_name,
                sport,
                periods: self.periods.max(0) as u32,
                quarters_score_as_halves: self.quarters_score_as_halves,
                espn_slug: self.espn_slug,
            },
            starts_at,
            timezone: self.timezone,
            period_prize: self.period_prize,
            final_prize: self.final_prize,
            score_url: self.score_url,
            status,
            grid: self.grid,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: i64,
    name: String,
    display_name: Option<String>,
    kind: String,
    active: bool,
    chances: i64,
}

impl ParticipantRow {
    fn into_participant(self) -> Option<Participant> {
        Some(Participant {
            id: self.id,
            name: self.name,
            display_name: self.display_name,
            kind: ParticipantKind::parse(&self.kind)?,
            active: self.active,
            chances: self.chances.max(0) as u32,
        })
    }
}
