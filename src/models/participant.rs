use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Individual,
    Single,
    Family,
    /// Pads the grid when active chances fall short of 100
    Charity,
}

impl ParticipantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantKind::Individual => "individual",
            ParticipantKind::Single => "single",
            ParticipantKind::Family => "family",
            ParticipantKind::Charity => "charity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "individual" => Some(ParticipantKind::Individual),
            "single" => Some(ParticipantKind::Single),
            "family" => Some(ParticipantKind::Family),
            "charity" => Some(ParticipantKind::Charity),
            _ => None,
        }
    }
}

/// Someone who can own squares
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub kind: ParticipantKind,
    pub active: bool,
    /// Number of squares this participant is entitled to
    pub chances: u32,
}

impl Participant {
    pub fn is_charity(&self) -> bool {
        self.kind == ParticipantKind::Charity
    }
}
