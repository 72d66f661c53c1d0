//! Port interfaces for scheduling collaborators
//!
//! These traits define the boundaries between core scheduling logic and
//! infrastructure implementations: the shared TTL cache backing the mutex
//! providers, the queue used by `Schedule::job`, and the process handles
//! the runner drives.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::error::SchedulerResult;
use super::event::Event;

/// Key-value cache with TTL semantics, shared across scheduler processes
///
/// `add` must be atomic (create-if-absent): of two concurrent calls for the
/// same absent key, exactly one may observe `true`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Atomically create `key` with the given lifetime; `true` on acquire,
    /// `false` when the key already exists
    async fn add(&self, key: &str, ttl: Duration) -> SchedulerResult<bool>;

    /// Non-mutating existence check
    async fn has(&self, key: &str) -> SchedulerResult<bool>;

    /// Delete unconditionally; deleting an absent key is not an error
    async fn forget(&self, key: &str) -> SchedulerResult<()>;
}

/// Per-event overlap lock
#[async_trait]
pub trait EventMutex: Send + Sync {
    /// Attempt to obtain the overlap mutex for the given event
    async fn create(&self, event: &Event) -> SchedulerResult<bool>;

    /// Determine if an overlap mutex exists for the given event
    async fn exists(&self, event: &Event) -> SchedulerResult<bool>;

    /// Clear the overlap mutex for the given event
    async fn forget(&self, event: &Event) -> SchedulerResult<()>;
}

/// Per-event-per-minute single-server lock
///
/// Keys embed the minute bucket of `time`, so at most one server can
/// acquire the mutex for a given event within a given minute.
#[async_trait]
pub trait SchedulingMutex: Send + Sync {
    /// Attempt to obtain the scheduling mutex for the event at `time`
    async fn create(&self, event: &Event, time: DateTime<Utc>) -> SchedulerResult<bool>;

    /// Determine if a scheduling mutex exists for the event at `time`
    async fn exists(&self, event: &Event, time: DateTime<Utc>) -> SchedulerResult<bool>;
}

/// Handle to a spawned (or spawnable) external process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Start the process without waiting for completion
    async fn start(&mut self) -> SchedulerResult<()>;

    /// Run the process to completion and return its exit code
    async fn run(&mut self) -> SchedulerResult<i32>;

    /// Non-blocking liveness check
    fn is_running(&mut self) -> SchedulerResult<bool>;

    /// Exit code, once the process has been observed to finish
    fn exit_code(&mut self) -> Option<i32>;

    /// Enforce the configured max runtime; kills the process and returns
    /// `SchedulerError::ProcessTimeout` when exceeded
    fn check_timeout(&mut self) -> SchedulerResult<()>;

    /// Drain stdout produced since the last call
    fn read_incremental_output(&mut self) -> String;

    /// Drain stderr produced since the last call
    fn read_incremental_error_output(&mut self) -> String;
}

/// Result of polling an in-flight process (pool mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Still running
    Running,
    /// Finished with this exit code
    Finished(i32),
    /// No process was ever attached
    NoProcess,
}

/// Factory turning a rendered command line into a process handle
pub trait ProcessSpawner: Send + Sync {
    /// Build a handle for the given command line, rooted at `working_dir`
    fn spawn(
        &self,
        command_line: &str,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> SchedulerResult<Box<dyn ProcessHandle>>;
}

/// Queue collaborator used by `Schedule::job` for queueable jobs
#[async_trait]
pub trait Queue: Send + Sync {
    /// Push a job payload onto the named queue
    async fn push(&self, job: &str, payload: Value, queue: Option<&str>) -> SchedulerResult<()>;

    /// Push a job payload onto the named queue after a delay
    async fn later(
        &self,
        delay: Duration,
        job: &str,
        payload: Value,
        queue: Option<&str>,
    ) -> SchedulerResult<()>;
}

/// A job that can be scheduled via `Schedule::job`
///
/// Whether the job is queued or run inline is decided per call from
/// `should_queue`, so runtime state controls the routing.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Stable job name (also the event description)
    fn name(&self) -> &str;

    /// When true the job is pushed to the queue instead of run inline
    fn should_queue(&self) -> bool {
        false
    }

    /// Preferred queue name, overridable at the registration site
    fn queue(&self) -> Option<&str> {
        None
    }

    /// Dispatch delay for queued jobs
    fn delay(&self) -> Option<Duration> {
        None
    }

    /// Serialized payload handed to the queue
    fn payload(&self) -> Value {
        Value::Null
    }

    /// Inline execution path
    async fn handle(&self) -> SchedulerResult<()>;
}
