use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::StartTimeError;

/// Lifecycle of a contest; only ever moves forward
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    Upcoming,
    InProgress,
    Completed,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Upcoming => "upcoming",
            ContestStatus::InProgress => "in_progress",
            ContestStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(ContestStatus::Upcoming),
            "in_progress" => Some(ContestStatus::InProgress),
            "completed" => Some(ContestStatus::Completed),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `next` keeps the lifecycle monotonic
    pub fn can_advance_to(&self, next: ContestStatus) -> bool {
        next > *self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Football,
    Basketball,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "football" => Some(Sport::Football),
            "basketball" => Some(Sport::Basketball),
            _ => None,
        }
    }
}

/// League format descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct League {
    pub id: i64,

    pub name: String,

    pub sport: Sport,

    /// Number of regulation scoring periods
    pub periods: u32,

    /// Sport displays quarters but pays out on halves (Q1 and Q3 are placeholders)
    pub quarters_score_as_halves: bool,

    /// Path segment for the structured score API (e.g. "mens-college-basketball")
    pub espn_slug: Option<String>,
}

impl League {
    /// Whether `period` (1-based) is recorded but carries no prize
    pub fn is_non_scoring(&self, period: u32) -> bool {
        self.quarters_score_as_halves && period % 2 == 1
    }
}

/// A scheduled sporting event tracked for squares settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: i64,

    pub title: Option<String>,

    pub league: League,

    /// Absolute kickoff instant
    pub starts_at: DateTime<Utc>,

    /// IANA zone the start time was entered in
    pub timezone: String,

    /// Prize for each non-final period
    pub period_prize: i64,

    /// Prize for the final period
    pub final_prize: i64,

    /// Upstream score page URL
    pub score_url: Option<String>,

    pub status: ContestStatus,

    /// Serialized grid assignment (`a{d}h{d}:{participant};...`)
    pub grid: Option<String>,
}

impl Contest {
    pub fn is_final_period(&self, period: u32) -> bool {
        period == self.league.periods
    }

    pub fn prize_for(&self, period: u32) -> i64 {
        if self.is_final_period(period) {
            self.final_prize
        } else {
            self.period_prize
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ContestStatus::Completed
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at
    }
}

/// Fields needed to create a contest
#[derive(Debug, Clone)]
pub struct NewContest {
    pub title: Option<String>,
    pub league_id: i64,
    pub starts_at: DateTime<Utc>,
    pub timezone: String,
    pub period_prize: i64,
    pub final_prize: i64,
    pub score_url: Option<String>,
    pub grid: Option<String>,
}

/// Combine a local date, local time and IANA zone into an absolute instant.
///
/// Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
pub fn start_instant(
    date: NaiveDate,
    time: NaiveTime,
    timezone: &str,
) -> Result<DateTime<Utc>, StartTimeError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| StartTimeError::UnknownZone(timezone.to_string()))?;

    let local = date.and_time(time);

    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| StartTimeError::Nonexistent(local.to_string(), timezone.to_string()))
}
