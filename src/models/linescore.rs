use serde::{Deserialize, Serialize};

/// Score recorded for a period that has not been played yet
pub const UNPLAYED: i32 = -1;

/// Per-period scores as reported by an upstream source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawLinescore {
    /// Away side, one entry per reported period (overtime included)
    pub away: Vec<i32>,

    /// Home side, aligned with `away`
    pub home: Vec<i32>,

    /// Upstream marked the contest final
    pub is_final: bool,
}

impl RawLinescore {
    pub fn new(away: Vec<i32>, home: Vec<i32>, is_final: bool) -> Self {
        Self {
            away,
            home,
            is_final,
        }
    }
}

/// Linescore compressed to the league's regulation periods
///
/// Each side holds at most `periods` entries; trailing periods the source has
/// not reported yet are simply absent and treated as unplayed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalScore {
    pub away: Vec<i32>,

    pub home: Vec<i32>,

    /// Overtime scoring was folded into the last regulation period
    pub overtime: bool,

    pub is_final: bool,
}

impl CanonicalScore {
    /// Scores for 1-based `period`, or `None` when either side is unplayed
    pub fn period(&self, period: u32) -> Option<(i32, i32)> {
        let idx = period.checked_sub(1)? as usize;
        let away = *self.away.get(idx)?;
        let home = *self.home.get(idx)?;

        if away == UNPLAYED || home == UNPLAYED {
            None
        } else {
            Some((away, home))
        }
    }

    /// Every reported value is zero (how the structured API looks before kickoff)
    pub fn is_blank(&self) -> bool {
        self.away.iter().chain(self.home.iter()).all(|&s| s == 0)
    }

    pub fn into_raw(self) -> RawLinescore {
        RawLinescore::new(self.away, self.home, self.is_final)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_lookup_skips_unplayed() {
        let score = CanonicalScore {
            away: vec![7, 7, 3, UNPLAYED],
            home: vec![0, 7, UNPLAYED, UNPLAYED],
            overtime: false,
            is_final: false,
        };

        assert_eq!(score.period(1), Some((7, 0)));
        assert_eq!(score.period(2), Some((7, 7)));
        assert_eq!(score.period(3), None);
        assert_eq!(score.period(4), None);
        assert_eq!(score.period(5), None);
        assert_eq!(score.period(0), None);
    }

    #[test]
    fn test_blank_detection() {
        let mut score = CanonicalScore {
            away: vec![0, 0, 0, 0],
            home: vec![0, 0, 0, 0],
            ..Default::default()
        };
        assert!(score.is_blank());

        score.home[0] = 3;
        assert!(!score.is_blank());

        // Unplayed periods are not zeros
        let partial = CanonicalScore {
            away: vec![0, UNPLAYED],
            home: vec![0, UNPLAYED],
            ..Default::default()
        };
        assert!(!partial.is_blank());

        assert!(CanonicalScore::default().is_blank());
    }
}
