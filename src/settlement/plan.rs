use crate::error::SettlementError;
use crate::grid::GridAssignment;
use crate::models::{grid_address, CanonicalScore, Contest, PeriodSettlement};

/// Work out the settlement rows for every played period of `score`.
///
/// Unplayed periods are skipped and contribute nothing to the running totals.
/// A grid miss fails the whole plan so nothing is written for the run.
pub fn plan_periods(
    contest: &Contest,
    grid: &GridAssignment,
    score: &CanonicalScore,
) -> Result<Vec<PeriodSettlement>, SettlementError> {
    let periods = contest.league.periods;
    let mut away_total: i32 = 0;
    let mut home_total: i32 = 0;
    let mut planned = Vec::new();

    for period in 1..=periods {
        let Some((away, home)) = score.period(period) else {
            continue;
        };

        let (Some(next_away), Some(next_home)) =
            (away_total.checked_add(away), home_total.checked_add(home))
        else {
            return Err(SettlementError::Validation(format!(
                "running total overflows at period {} ({} + {}, {} + {})",
                period, away_total, away, home_total, home
            )));
        };
        away_total = next_away;
        home_total = next_home;

        let winner_id = grid
            .resolve(away_total, home_total)
            .ok_or_else(|| SettlementError::GridMiss(grid_address(away_total, home_total)))?;

        planned.push(PeriodSettlement {
            contest_id: contest.id,
            period,
            away,
            home,
            away_total,
            home_total,
            complete: true,
            overtime: period == periods && score.overtime,
            non_scoring: contest.league.is_non_scoring(period),
            prize: contest.prize_for(period),
            winner_id,
        });
    }

    Ok(planned)
}
