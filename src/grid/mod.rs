pub mod probability;

use std::collections::HashMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::db::ContestStore;
use crate::error::{GridError, SettlementError};
use crate::models::Participant;

pub use probability::SquareProbability;

/// Squares on a board
pub const GRID_SQUARES: usize = 100;

/// Shuffle passes applied to the slot list before assignment
pub const SHUFFLE_PASSES: usize = 99;

/// Participant assignment for the 10x10 board of last-digit pairs.
///
/// Squares are indexed row-major by away digit, then home digit. A square is
/// `None` only when a persisted grid was edited into an incomplete state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridAssignment {
    squares: [Option<i64>; GRID_SQUARES],
}

impl GridAssignment {
    /// Expand entrants into weighted slots, padding with fillers up to 100.
    ///
    /// The returned list is in entrant order followed by fillers, unshuffled.
    pub fn slot_list<R: Rng + ?Sized>(
        entrants: &[Participant],
        fillers: &[Participant],
        rng: &mut R,
    ) -> Result<Vec<i64>, GridError> {
        let mut slots: Vec<i64> = entrants
            .iter()
            .filter(|p| p.active && !p.is_charity())
            .flat_map(|p| std::iter::repeat(p.id).take(p.chances as usize))
            .collect();

        if slots.len() > GRID_SQUARES {
            return Err(GridError::Oversubscribed(slots.len()));
        }

        let missing = GRID_SQUARES - slots.len();
        if missing > 0 {
            if fillers.is_empty() {
                return Err(GridError::NoFillers(missing));
            }
            for _ in 0..missing {
                if let Some(filler) = fillers.choose(rng) {
                    slots.push(filler.id);
                }
            }
        }

        Ok(slots)
    }

    /// Build a fresh, thoroughly shuffled grid
    pub fn build<R: Rng + ?Sized>(
        entrants: &[Participant],
        fillers: &[Participant],
        rng: &mut R,
    ) -> Result<Self, GridError> {
        let mut slots = Self::slot_list(entrants, fillers, rng)?;

        for _ in 0..SHUFFLE_PASSES {
            slots.shuffle(rng);
        }

        let mut squares = [None; GRID_SQUARES];
        for (square, participant) in squares.iter_mut().zip(slots) {
            *square = Some(participant);
        }

        debug!("Built grid from {} entrants", entrants.len());
        Ok(Self { squares })
    }

    /// Parse the persisted `a{d}h{d}:{participant}` list joined by `;`
    pub fn parse(serialized: &str) -> Result<Self, GridError> {
        let mut squares = [None; GRID_SQUARES];

        for entry in serialized.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (address, participant) = entry
                .split_once(':')
                .ok_or_else(|| GridError::Malformed(entry.to_string()))?;

            let (away, home) =
                parse_address(address).ok_or_else(|| GridError::Malformed(entry.to_string()))?;
            let participant: i64 = participant
                .trim()
                .parse()
                .map_err(|_| GridError::Malformed(entry.to_string()))?;

            let slot = &mut squares[index(away, home)];
            if slot.is_some() {
                return Err(GridError::Malformed(format!("duplicate square {}", address)));
            }
            *slot = Some(participant);
        }

        Ok(Self { squares })
    }

    /// Participant owning the square for a pair of running totals
    pub fn resolve(&self, away_total: i32, home_total: i32) -> Option<i64> {
        let away = away_total.rem_euclid(10) as u8;
        let home = home_total.rem_euclid(10) as u8;
        self.squares[index(away, home)]
    }

    pub fn participant_at(&self, away_digit: u8, home_digit: u8) -> Option<i64> {
        if away_digit > 9 || home_digit > 9 {
            return None;
        }
        self.squares[index(away_digit, home_digit)]
    }

    pub fn is_complete(&self) -> bool {
        self.squares.iter().all(Option::is_some)
    }

    /// Number of squares held by each participant
    pub fn counts(&self) -> HashMap<i64, usize> {
        let mut counts = HashMap::new();
        for participant in self.squares.iter().flatten() {
            *counts.entry(*participant).or_insert(0) += 1;
        }
        counts
    }

    /// Serialize in row-major order; stable because it is persisted
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GridAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for away in 0..10u8 {
            for home in 0..10u8 {
                if let Some(participant) = self.squares[index(away, home)] {
                    if !first {
                        f.write_str(";")?;
                    }
                    write!(f, "a{}h{}:{}", away, home, participant)?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

fn index(away_digit: u8, home_digit: u8) -> usize {
    away_digit as usize * 10 + home_digit as usize
}

/// `a3h7` -> (3, 7)
fn parse_address(address: &str) -> Option<(u8, u8)> {
    let rest = address.trim().strip_prefix('a')?;
    let (away, home) = rest.split_once('h')?;

    let away: u8 = away.parse().ok()?;
    let home: u8 = home.parse().ok()?;

    (away <= 9 && home <= 9).then_some((away, home))
}

/// Load the contest's grid, building and persisting one if it has none.
///
/// An existing grid is never rebuilt.
pub async fn ensure_for_contest<R: Rng + Send>(
    store: &ContestStore,
    contest_id: i64,
    rng: &mut R,
) -> Result<GridAssignment, SettlementError> {
    let contest = store
        .get_contest(contest_id)
        .await?
        .ok_or(SettlementError::ContestNotFound(contest_id))?;

    if let Some(serialized) = contest.grid.as_deref() {
        return Ok(GridAssignment::parse(serialized)?);
    }

    let entrants = store.active_participants().await?;
    let fillers = store.charities().await?;

    let grid = GridAssignment::build(&entrants, &fillers, rng)?;

    if !store.assign_grid(contest_id, &grid.serialize()).await? {
        // Someone else assigned first; theirs wins
        let contest = store
            .get_contest(contest_id)
            .await?
            .ok_or(SettlementError::ContestNotFound(contest_id))?;
        let serialized = contest.grid.ok_or(SettlementError::MissingGrid(contest_id))?;
        return Ok(GridAssignment::parse(&serialized)?);
    }

    info!("Assigned grid for contest {}", contest_id);
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn participant(id: i64, chances: u32, kind: ParticipantKind) -> Participant {
        Participant {
            id,
            name: format!("P{}", id),
            display_name: None,
            kind,
            active: true,
            chances,
        }
    }

    fn entrants() -> Vec<Participant> {
        vec![
            participant(1, 10, ParticipantKind::Individual),
            participant(2, 25, ParticipantKind::Family),
            participant(3, 5, ParticipantKind::Single),
        ]
    }

    fn charities() -> Vec<Participant> {
        vec![
            participant(90, 0, ParticipantKind::Charity),
            participant(91, 0, ParticipantKind::Charity),
        ]
    }

    #[test]
    fn test_slot_list_respects_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        let slots = GridAssignment::slot_list(&entrants(), &charities(), &mut rng).unwrap();

        assert_eq!(slots.len(), GRID_SQUARES);
        assert_eq!(slots.iter().filter(|&&id| id == 1).count(), 10);
        assert_eq!(slots.iter().filter(|&&id| id == 2).count(), 25);
        assert_eq!(slots.iter().filter(|&&id| id == 3).count(), 5);
        assert_eq!(
            slots.iter().filter(|&&id| id == 90 || id == 91).count(),
            60
        );
    }

    #[test]
    fn test_inactive_entrants_get_no_slots() {
        let mut people = entrants();
        people[1].active = false;

        let mut rng = StdRng::seed_from_u64(7);
        let slots = GridAssignment::slot_list(&people, &charities(), &mut rng).unwrap();
        assert!(!slots.contains(&2));
    }

    #[test]
    fn test_build_is_exhaustive_and_weighted() {
        let mut rng = StdRng::seed_from_u64(42);
        let grid = GridAssignment::build(&entrants(), &charities(), &mut rng).unwrap();

        assert!(grid.is_complete());
        for away in 0..10 {
            for home in 0..10 {
                assert!(grid.participant_at(away, home).is_some());
            }
        }

        let counts = grid.counts();
        assert_eq!(counts.values().sum::<usize>(), GRID_SQUARES);
        assert_eq!(counts[&1], 10);
        assert_eq!(counts[&2], 25);
        assert_eq!(counts[&3], 5);
    }

    #[test]
    fn test_build_rejects_oversubscription_and_missing_fillers() {
        let mut rng = StdRng::seed_from_u64(1);
        let greedy = vec![participant(1, 101, ParticipantKind::Individual)];
        assert_eq!(
            GridAssignment::build(&greedy, &charities(), &mut rng),
            Err(GridError::Oversubscribed(101))
        );

        assert_eq!(
            GridAssignment::build(&entrants(), &[], &mut rng),
            Err(GridError::NoFillers(60))
        );
    }

    #[test]
    fn test_serialize_parse_preserves_assignment() {
        let mut rng = StdRng::seed_from_u64(3);
        let grid = GridAssignment::build(&entrants(), &charities(), &mut rng).unwrap();

        let serialized = grid.serialize();
        assert_eq!(serialized.split(';').count(), GRID_SQUARES);
        assert!(serialized.starts_with("a0h0:"));

        let parsed = GridAssignment::parse(&serialized).unwrap();
        assert_eq!(parsed, grid);
    }

    #[test]
    fn test_resolve_uses_last_digit() {
        let serialized: Vec<String> = (0..10)
            .flat_map(|a| (0..10).map(move |h| format!("a{}h{}:{}", a, h, a * 10 + h)))
            .collect();
        let grid = GridAssignment::parse(&serialized.join(";")).unwrap();

        assert_eq!(grid.resolve(23, 17), Some(37));
        assert_eq!(grid.resolve(0, 0), Some(0));
        assert_eq!(grid.resolve(109, 40), Some(90));
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert!(matches!(
            GridAssignment::parse("a0h0:1;a0h0:2"),
            Err(GridError::Malformed(_))
        ));
        assert!(matches!(
            GridAssignment::parse("a10h0:1"),
            Err(GridError::Malformed(_))
        ));
        assert!(matches!(
            GridAssignment::parse("a1h1=4"),
            Err(GridError::Malformed(_))
        ));
    }

    #[test]
    fn test_incomplete_grid_misses() {
        let grid = GridAssignment::parse("a0h0:5;a3h7:6").unwrap();
        assert!(!grid.is_complete());
        assert_eq!(grid.resolve(23, 17), Some(6));
        assert_eq!(grid.resolve(1, 1), None);
    }

    #[tokio::test]
    async fn test_ensure_builds_once_and_never_rebuilds() {
        let fx = crate::testing::fixture().await;
        let mut rng = StdRng::seed_from_u64(11);

        let existing = ensure_for_contest(&fx.contests, fx.contest_id, &mut rng)
            .await
            .unwrap();
        assert_eq!(existing, fx.grid);

        let fresh_id = crate::testing::seed_contest(&fx, chrono::Utc::now(), None).await;
        let built = ensure_for_contest(&fx.contests, fresh_id, &mut rng)
            .await
            .unwrap();
        assert!(built.is_complete());
        assert_eq!(built.counts().values().sum::<usize>(), GRID_SQUARES);

        let again = ensure_for_contest(&fx.contests, fresh_id, &mut rng)
            .await
            .unwrap();
        assert_eq!(again, built);

        assert!(matches!(
            ensure_for_contest(&fx.contests, 9_999, &mut rng).await,
            Err(SettlementError::ContestNotFound(9_999))
        ));
    }
}
