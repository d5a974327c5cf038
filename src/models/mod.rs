pub mod activity;
pub mod contest;
pub mod linescore;
pub mod participant;
pub mod settlement;

pub use activity::{ActivityAction, ActivityLevel, ActivityRecord, ActivitySubject};
pub use contest::{start_instant, Contest, ContestStatus, League, NewContest, Sport};
pub use linescore::{CanonicalScore, RawLinescore, UNPLAYED};
pub use participant::{Participant, ParticipantKind};
pub use settlement::{grid_address, ManualScores, PeriodChange, PeriodSettlement, SettlementKind};
