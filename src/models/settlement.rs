use serde::{Deserialize, Serialize};

/// Canonical result for one period of one contest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodSettlement {
    pub contest_id: i64,

    /// 1-based period number
    pub period: u32,

    /// Points scored in this period
    pub away: i32,
    pub home: i32,

    /// Running totals through this period
    pub away_total: i32,
    pub home_total: i32,

    pub complete: bool,

    /// Final period absorbed overtime scoring
    pub overtime: bool,

    /// Placeholder period that records a score but pays nothing
    pub non_scoring: bool,

    pub prize: i64,

    /// Participant owning the square for the running totals
    pub winner_id: i64,
}

impl PeriodSettlement {
    /// Grid square for the running totals, e.g. `a3h7`
    pub fn grid_address(&self) -> String {
        grid_address(self.away_total, self.home_total)
    }

    /// Short header for score tables, e.g. `4/OT`
    pub fn period_header(&self) -> String {
        if self.overtime {
            format!("{}/OT", self.period)
        } else {
            self.period.to_string()
        }
    }

    pub fn awards_prize(&self) -> bool {
        self.complete && !self.non_scoring
    }
}

/// Square address for a pair of running totals
pub fn grid_address(away_total: i32, home_total: i32) -> String {
    format!(
        "a{}h{}",
        away_total.rem_euclid(10),
        home_total.rem_euclid(10)
    )
}

/// Before/after view of one period touched by a settlement run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodChange {
    pub period: u32,
    pub before: Option<PeriodSettlement>,
    pub after: PeriodSettlement,
}

impl PeriodChange {
    pub fn is_unchanged(&self) -> bool {
        self.before.as_ref() == Some(&self.after)
    }
}

/// Who initiated a settlement run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementKind {
    /// Scraper refresh; carries the source label and locator
    Automated { source: String, score_url: String },
    /// Operator correction; carries the audit reason
    Manual { reason: String },
}

/// Operator-supplied per-period scores; `None` marks an unplayed period
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualScores {
    pub away: Vec<Option<i32>>,
    pub home: Vec<Option<i32>>,
    pub mark_final: bool,
    pub overtime: bool,
    pub reason: String,
}
