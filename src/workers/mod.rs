pub mod active_sweeper;
pub mod heartbeat;
pub mod refresher;
pub mod retry;
pub mod scheduler;

pub use active_sweeper::ActiveContestSweeper;
pub use heartbeat::{HeartbeatStatus, QueueHeartbeat};
pub use refresher::{ContestRefresher, RefreshOutcome, SkipReason};
pub use retry::RetryPolicy;
pub use scheduler::RefreshScheduler;
