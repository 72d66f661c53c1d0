//! Task lifecycle notifications
//!
//! The four lifecycle events (starting, finished, skipped, failed) are
//! emitted around every run. This trait is the scheduler's sole extension
//! seam for external observers: logging, metrics, and alerting all attach
//! here.

use std::time::Duration;

use super::error::SchedulerError;
use super::event::Event;

/// Observer for scheduled-task lifecycle events
pub trait NotificationSink: Send + Sync {
    /// A task is about to run
    fn task_starting(&self, event: &Event);

    /// A task finished (any exit code) after `runtime`
    fn task_finished(&self, event: &Event, runtime: Duration);

    /// A task was held back by its filters or by single-server election
    fn task_skipped(&self, event: &Event);

    /// A task failed with a genuine error (not a non-zero exit code)
    fn task_failed(&self, event: &Event, error: &SchedulerError);
}

/// No-op sink for embedders that do not observe task lifecycles
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl NotificationSink for NullNotifier {
    fn task_starting(&self, _event: &Event) {}

    fn task_finished(&self, _event: &Event, _runtime: Duration) {}

    fn task_skipped(&self, _event: &Event) {}

    fn task_failed(&self, _event: &Event, _error: &SchedulerError) {}
}
