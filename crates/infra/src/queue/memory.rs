//! In-memory queue
//!
//! Records dispatches instead of delivering them. Sufficient for
//! single-process deployments, demos, and tests; real deployments plug a
//! broker-backed implementation into the same port.

use std::time::Duration;

use async_trait::async_trait;
use chronarc_core::{Queue, SchedulerResult};
use parking_lot::Mutex;
use serde_json::Value;

/// One recorded dispatch
#[derive(Debug, Clone)]
pub struct DispatchedJob {
    /// Job name
    pub job: String,
    /// Serialized payload
    pub payload: Value,
    /// Target queue, when named
    pub queue: Option<String>,
    /// Dispatch delay, for `later` pushes
    pub delay: Option<Duration>,
}

/// Queue that stores dispatched jobs in memory
#[derive(Debug, Default)]
pub struct MemoryQueue {
    dispatched: Mutex<Vec<DispatchedJob>>,
}

impl MemoryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything dispatched so far
    pub fn dispatched(&self) -> Vec<DispatchedJob> {
        self.dispatched.lock().clone()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push(&self, job: &str, payload: Value, queue: Option<&str>) -> SchedulerResult<()> {
        self.dispatched.lock().push(DispatchedJob {
            job: job.to_string(),
            payload,
            queue: queue.map(String::from),
            delay: None,
        });
        Ok(())
    }

    async fn later(
        &self,
        delay: Duration,
        job: &str,
        payload: Value,
        queue: Option<&str>,
    ) -> SchedulerResult<()> {
        self.dispatched.lock().push(DispatchedJob {
            job: job.to_string(),
            payload,
            queue: queue.map(String::from),
            delay: Some(delay),
        });
        Ok(())
    }
}
