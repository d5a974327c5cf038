use crate::models::Sport;

/// Relative frequency of each final-score last digit in football.
/// TD + PAT makes 7 dominant; 0, 3 and 4 follow from field goals and shutouts.
const FOOTBALL_DIGITS: [f64; 10] = [
    0.095, 0.047, 0.023, 0.098, 0.101, 0.028, 0.054, 0.146, 0.052, 0.042,
];

/// Basketball scoring spreads almost evenly over digits
const BASKETBALL_DIGITS: [f64; 10] = [
    0.099, 0.101, 0.102, 0.098, 0.100, 0.101, 0.099, 0.100, 0.101, 0.099,
];

/// Estimated chance that each square wins, assuming independent sides
#[derive(Debug, Clone)]
pub struct SquareProbability {
    digits: [f64; 10],
}

impl SquareProbability {
    pub fn for_sport(sport: Sport) -> Self {
        match sport {
            Sport::Football => Self::from_frequencies(FOOTBALL_DIGITS),
            Sport::Basketball => Self::from_frequencies(BASKETBALL_DIGITS),
        }
    }

    pub fn uniform() -> Self {
        Self { digits: [0.1; 10] }
    }

    /// Normalizes the frequencies so the board sums to 1
    pub fn from_frequencies(frequencies: [f64; 10]) -> Self {
        let total: f64 = frequencies.iter().sum();
        if total <= 0.0 {
            return Self::uniform();
        }

        let mut digits = frequencies;
        for d in digits.iter_mut() {
            *d /= total;
        }
        Self { digits }
    }

    pub fn probability_for(&self, away_digit: u8, home_digit: u8) -> f64 {
        let away = self.digits.get(away_digit as usize).copied().unwrap_or(0.0);
        let home = self.digits.get(home_digit as usize).copied().unwrap_or(0.0);
        away * home
    }

    /// `[away][home]` probabilities for the whole board
    pub fn grid(&self) -> [[f64; 10]; 10] {
        let mut grid = [[0.0; 10]; 10];
        for (away, row) in grid.iter_mut().enumerate() {
            for (home, cell) in row.iter_mut().enumerate() {
                *cell = self.probability_for(away as u8, home as u8);
            }
        }
        grid
    }

    /// Display string such as `1.4%`
    pub fn percentage_for(&self, away_digit: u8, home_digit: u8) -> String {
        format!("{:.1}%", self.probability_for(away_digit, home_digit) * 100.0)
    }
}
