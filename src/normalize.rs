use tracing::debug;

use crate::error::ScrapeError;
use crate::models::{CanonicalScore, RawLinescore, UNPLAYED};

/// Compress a raw linescore into the league's regulation periods.
///
/// Any periods beyond `periods` are overtime and are summed into the last
/// regulation period, which is then flagged as overtime.
pub fn normalize(raw: &RawLinescore, periods: u32) -> Result<CanonicalScore, ScrapeError> {
    if raw.away.len() != raw.home.len() {
        return Err(ScrapeError::permanent(format!(
            "Mismatched period lengths (away {}, home {})",
            raw.away.len(),
            raw.home.len()
        )));
    }

    if periods == 0 {
        return Err(ScrapeError::permanent("League has no scoring periods"));
    }

    let periods = periods as usize;
    let overtime = raw.away.len() > periods;

    if overtime {
        debug!(
            "Folding {} overtime period(s) into period {}",
            raw.away.len() - periods,
            periods
        );
    }

    Ok(CanonicalScore {
        away: fold_overtime(&raw.away, periods),
        home: fold_overtime(&raw.home, periods),
        overtime,
        is_final: raw.is_final,
    })
}

fn fold_overtime(line: &[i32], periods: usize) -> Vec<i32> {
    let split = line.len().min(periods);
    let (regulation, overtime) = line.split_at(split);
    let mut regulation = regulation.to_vec();

    let extra: i32 = overtime.iter().filter(|&&s| s != UNPLAYED).sum();
    if !overtime.is_empty() {
        if let Some(last) = regulation.last_mut() {
            if *last != UNPLAYED {
                *last += extra;
            }
        }
    }

    regulation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regulation_passes_through() {
        let raw = RawLinescore::new(vec![7, 7, 3, UNPLAYED], vec![0, 7, UNPLAYED, UNPLAYED], false);
        let score = normalize(&raw, 4).unwrap();

        assert_eq!(score.away, vec![7, 7, 3, UNPLAYED]);
        assert_eq!(score.home, vec![0, 7, UNPLAYED, UNPLAYED]);
        assert!(!score.overtime);
        assert!(!score.is_final);
    }

    #[test]
    fn test_overtime_folds_into_last_period() {
        let raw = RawLinescore::new(vec![7, 3, 7, 7, 3, 6], vec![0, 10, 7, 7, 3, 0], true);
        let score = normalize(&raw, 4).unwrap();

        assert_eq!(score.away, vec![7, 3, 7, 16]);
        assert_eq!(score.home, vec![0, 10, 7, 10]);
        assert!(score.overtime);
        assert!(score.is_final);
    }

    #[test]
    fn test_renormalizing_is_a_no_op() {
        let raw = RawLinescore::new(vec![20, 18, 9, 4], vec![22, 16, 5, 6], true);
        let once = normalize(&raw, 2).unwrap();
        let twice = normalize(&once.clone().into_raw(), 2).unwrap();

        assert_eq!(once.away, vec![20, 31]);
        assert_eq!(twice.away, once.away);
        assert_eq!(twice.home, once.home);
        assert!(!twice.overtime);
    }

    #[test]
    fn test_mismatched_lengths_are_permanent() {
        let raw = RawLinescore::new(vec![7, 7], vec![0], false);
        let err = normalize(&raw, 4).unwrap_err();
        assert!(matches!(err, ScrapeError::Permanent(_)));
    }

    #[test]
    fn test_pre_game_stays_empty() {
        let score = normalize(&RawLinescore::default(), 4).unwrap();
        assert!(score.away.is_empty());
        assert!(score.is_blank());
    }
}
