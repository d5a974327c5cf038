//! Shared fixtures for store-backed tests

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::db::{self, ActivityLogStore, ContestStore, ScoreStore};
use crate::grid::GridAssignment;
use crate::models::{League, NewContest, Participant, ParticipantKind, Sport};

pub const ESPN_URL: &str = "https://www.espn.com/nfl/game/_/gameId/401547417";

pub struct Fixture {
    pub contests: ContestStore,
    pub scores: ScoreStore,
    pub activity: Arc<ActivityLogStore>,
    pub league_id: i64,
    pub contest_id: i64,
    pub grid: GridAssignment,
}

/// Four-period league that pays on halves, one contest past kickoff
pub async fn fixture() -> Fixture {
    fixture_with(true).await
}

pub async fn fixture_with(quarters_score_as_halves: bool) -> Fixture {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let contests = ContestStore::new(pool.clone());
    let scores = ScoreStore::new(pool.clone());
    let activity = Arc::new(ActivityLogStore::new(pool));

    let league_id = contests
        .insert_league(&League {
            id: 0,
            name: "NFL".to_string(),
            sport: Sport::Football,
            periods: 4,
            quarters_score_as_halves,
            espn_slug: Some("nfl".to_string()),
        })
        .await
        .unwrap();

    let mut entrants = Vec::new();
    for (name, chances) in [("Ann", 10), ("Bo", 20), ("Cy", 30), ("Di", 20)] {
        let mut p = participant(name, chances, ParticipantKind::Individual);
        p.id = contests.insert_participant(&p).await.unwrap();
        entrants.push(p);
    }

    let mut fillers = Vec::new();
    for name in ["Food Bank", "Shelter"] {
        let mut p = participant(name, 0, ParticipantKind::Charity);
        p.id = contests.insert_participant(&p).await.unwrap();
        fillers.push(p);
    }

    let mut rng = StdRng::seed_from_u64(2024);
    let grid = GridAssignment::build(&entrants, &fillers, &mut rng).unwrap();

    let contest_id = contests
        .insert_contest(&NewContest {
            title: Some("Rivalry".to_string()),
            league_id,
            starts_at: Utc::now() - Duration::minutes(5),
            timezone: "America/New_York".to_string(),
            period_prize: 25,
            final_prize: 100,
            score_url: Some(ESPN_URL.to_string()),
            grid: Some(grid.serialize()),
        })
        .await
        .unwrap();

    Fixture {
        contests,
        scores,
        activity,
        league_id,
        contest_id,
        grid,
    }
}

/// Another contest in the fixture's league sharing its grid
pub async fn seed_contest(fx: &Fixture, starts_at: DateTime<Utc>, score_url: Option<&str>) -> i64 {
    fx.contests
        .insert_contest(&NewContest {
            title: None,
            league_id: fx.league_id,
            starts_at,
            timezone: "UTC".to_string(),
            period_prize: 25,
            final_prize: 100,
            score_url: score_url.map(str::to_string),
            grid: None,
        })
        .await
        .unwrap()
}

fn participant(name: &str, chances: u32, kind: ParticipantKind) -> Participant {
    Participant {
        id: 0,
        name: name.to_string(),
        display_name: None,
        kind,
        active: true,
        chances,
    }
}
