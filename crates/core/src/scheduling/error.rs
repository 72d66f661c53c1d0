//! Scheduler error types

use chronarc_common::time::CronParseError;
use chronarc_domain::ChronarcError;
use thiserror::Error;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Sub-minute repeat interval must evenly divide one minute
    #[error("The repeat interval [{seconds}] is not evenly divisible into 60 seconds")]
    InvalidRepeatInterval { seconds: u32 },

    /// Overlap protection on a callback event needs a stable identity
    #[error("A scheduled event name is required to prevent overlapping; call name() before without_overlapping()")]
    OverlapRequiresName,

    /// Cron expression failed to parse
    #[error(transparent)]
    InvalidCron(#[from] CronParseError),

    /// Timezone string is not a known IANA zone
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Time-of-day string is not `HH:MM`
    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    /// Cache store failure (no degraded fallback is defined)
    #[error("Cache store error: {0}")]
    Cache(String),

    /// Process spawn or wait failure
    #[error("Process error: {0}")]
    Process(String),

    /// Process exceeded its configured max runtime
    #[error("Process exceeded its timeout of {timeout_secs}s")]
    ProcessTimeout { timeout_secs: u64 },

    /// Queue dispatch failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// A scheduled callback returned an error
    #[error("Callback failed: {0}")]
    Callback(String),
}

impl From<SchedulerError> for ChronarcError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidRepeatInterval { .. }
            | SchedulerError::OverlapRequiresName
            | SchedulerError::InvalidCron(_)
            | SchedulerError::InvalidTimezone(_)
            | SchedulerError::InvalidTimeOfDay(_) => ChronarcError::Config(err.to_string()),
            SchedulerError::Cache(_) => ChronarcError::Cache(err.to_string()),
            SchedulerError::Process(_) | SchedulerError::ProcessTimeout { .. } => {
                ChronarcError::Process(err.to_string())
            }
            SchedulerError::Queue(_) => ChronarcError::Queue(err.to_string()),
            SchedulerError::Callback(_) => ChronarcError::Internal(err.to_string()),
        }
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
