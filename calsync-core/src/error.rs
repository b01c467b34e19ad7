//! Error types for calendar feed synchronization.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Request- and run-level errors.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("connectionId is required")]
    MissingConnectionId,

    #[error("Calendar connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Calendar connection '{0}' has no feed address configured")]
    MissingFeedAddress(String),

    #[error("A sync is already running for connection '{0}'")]
    SyncInProgress(String),

    #[error("Failed to fetch calendar feed: {reason}")]
    FetchFailed { reason: String },

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures reported by collaborator stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why an event entry was not turned into an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingStart,
    EndBeforeStart,
    UnresolvableTime,
    DurationOutOfRange,
    NotAnEvent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::MissingStart => "event has no start time",
            SkipReason::EndBeforeStart => "event ends before it starts",
            SkipReason::UnresolvableTime => "event time does not exist in its timezone",
            SkipReason::DurationOutOfRange => "event duration is out of range",
            SkipReason::NotAnEvent => "entry is not an event",
        };
        f.write_str(reason)
    }
}

/// A single draft that could not be written to the appointment store.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{external_id}: {source}")]
pub struct PersistError {
    pub external_id: String,
    #[source]
    pub source: StoreError,
}

/// Failure of one fetch strategy. The fetcher aggregates these into
/// [`SyncError::FetchFailed`] once every strategy has failed.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("unreadable feed: {0}")]
    Parse(String),

    #[error("timed out after {}", format_timeout(.0))]
    Timeout(Duration),
}

fn format_timeout(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}
