use thiserror::Error;

/// Failure while fetching or parsing an upstream linescore
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScrapeError {
    /// Timeout, connection failure or 5xx; worth retrying
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The source has no linescore yet because the contest has not kicked off
    #[error("no linescore data available yet (pre-game)")]
    PreGame,

    /// Malformed or missing data, 4xx, unsupported source; never retried
    #[error("scrape failed: {0}")]
    Permanent(String),
}

impl ScrapeError {
    pub fn transient(msg: impl Into<String>) -> Self {
        ScrapeError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        ScrapeError::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ScrapeError::Transient(_))
    }

    pub fn is_pre_game(&self) -> bool {
        matches!(self, ScrapeError::PreGame)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Transient(_) => "transient",
            ScrapeError::PreGame => "pre_game",
            ScrapeError::Permanent(_) => "permanent",
        }
    }
}

/// Failure while building or decoding a grid assignment
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("active chances total {0}, more than the 100 squares available")]
    Oversubscribed(usize),

    #[error("{0} squares need filler participants but none are available")]
    NoFillers(usize),

    #[error("malformed grid entry: {0}")]
    Malformed(String),

    #[error("grid has {0} distinct squares, expected 100")]
    Incomplete(usize),
}

/// Failure during a settlement run; every variant means nothing was committed
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("contest {0} not found")]
    ContestNotFound(i64),

    #[error("contest {0} has no grid assignment")]
    MissingGrid(i64),

    #[error("contest {0} is already completed")]
    AlreadyCompleted(i64),

    #[error("invalid grid: {0}")]
    Grid(#[from] GridError),

    #[error("grid has no participant for square {0}")]
    GridMiss(String),

    #[error("invalid score: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SettlementError {
    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::ContestNotFound(_) => "contest_not_found",
            SettlementError::MissingGrid(_) => "missing_grid",
            SettlementError::AlreadyCompleted(_) => "already_completed",
            SettlementError::Grid(_) => "invalid_grid",
            SettlementError::GridMiss(_) => "grid_miss",
            SettlementError::Validation(_) => "validation",
            SettlementError::Database(_) => "database",
        }
    }
}

/// Failure of a full refresh cycle for one contest
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RefreshError {
    pub fn is_pre_game(&self) -> bool {
        matches!(self, RefreshError::Scrape(e) if e.is_pre_game())
    }
}

/// Local start date/time that cannot be turned into an instant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartTimeError {
    #[error("unknown timezone: {0}")]
    UnknownZone(String),

    #[error("local time {0} does not exist in {1}")]
    Nonexistent(String, String),
}

/// Contest score locator that cannot be used
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocatorError {
    /// Not an http(s) URL at all; the contest is skipped quietly
    #[error("invalid score URL: {0}")]
    Invalid(String),

    /// A valid URL for a site we have no adapter for
    #[error("unsupported score URL: {0}")]
    Unsupported(String),
}

impl From<LocatorError> for ScrapeError {
    fn from(err: LocatorError) -> Self {
        ScrapeError::Permanent(err.to_string())
    }
}

/// Failure while moving a contest's scheduled refresh
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    StartTime(#[from] StartTimeError),

    #[error("contest {0} is not upcoming; its start can no longer change")]
    NotUpcoming(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
