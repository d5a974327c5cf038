use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::debug;

use crate::models::{PeriodChange, PeriodSettlement};

/// SQLite store for per-period settlements
#[derive(Clone)]
pub struct ScoreStore {
    pool: Pool<Sqlite>,
}

impl ScoreStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Settled periods for a contest, in period order
    pub async fn for_contest(&self, contest_id: i64) -> Result<Vec<PeriodSettlement>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ScoreRow>(
            r#"
            SELECT * FROM scores
            WHERE contest_id = ?
            ORDER BY period ASC
            "#,
        )
        .bind(contest_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Replace the given periods in one transaction.
    ///
    /// Each period's existing row is deleted and the new one inserted; any
    /// failure rolls back every period written in this call.
    pub async fn replace_periods(
        &self,
        contest_id: i64,
        settlements: &[PeriodSettlement],
    ) -> Result<Vec<PeriodChange>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut changes = Vec::with_capacity(settlements.len());

        for settlement in settlements {
            let before = fetch_period(&mut *tx, contest_id, settlement.period).await?;

            sqlx::query("DELETE FROM scores WHERE contest_id = ? AND period = ?")
                .bind(contest_id)
                .bind(settlement.period as i64)
                .execute(&mut *tx)
                .await?;

            insert_period(&mut *tx, contest_id, settlement).await?;

            changes.push(PeriodChange {
                period: settlement.period,
                before,
                after: settlement.clone(),
            });
        }

        tx.commit().await?;

        debug!(
            "Replaced {} period(s) for contest {}",
            changes.len(),
            contest_id
        );
        Ok(changes)
    }
}

async fn fetch_period(
    conn: &mut SqliteConnection,
    contest_id: i64,
    period: u32,
) -> Result<Option<PeriodSettlement>, sqlx::Error> {
    let row = sqlx::query_as::<_, ScoreRow>(
        "SELECT * FROM scores WHERE contest_id = ? AND period = ?",
    )
    .bind(contest_id)
    .bind(period as i64)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Into::into))
}

async fn insert_period(
    conn: &mut SqliteConnection,
    contest_id: i64,
    s: &PeriodSettlement,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO scores (
            contest_id, period, away, home, away_total, home_total,
            complete, overtime, non_scoring, prize, winner_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(contest_id)
    .bind(s.period as i64)
    .bind(s.away)
    .bind(s.home)
    .bind(s.away_total)
    .bind(s.home_total)
    .bind(s.complete)
    .bind(s.overtime)
    .bind(s.non_scoring)
    .bind(s.prize)
    .bind(s.winner_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct ScoreRow {
    contest_id: i64,
    period: i64,
    away: i32,
    home: i32,
    away_total: i32,
    home_total: i32,
    complete: bool,
    overtime: bool,
    non_scoring: bool,
    prize: i64,
    winner_id: i64,
}

impl From<ScoreRow> for PeriodSettlement {
    fn from(row: ScoreRow) -> Self {
        PeriodSettlement {
            contest_id: row.contest_id,
            period: row.period.max(0) as u32,
            away: row.away,
            home: row.home,
            away_total: row.away_total,
            home_total: row.home_total,
            complete: row.complete,
            overtime: row.overtime,
            non_scoring: row.non_scoring,
            prize: row.prize,
            winner_id: row.winner_id,
        }
    }
}
