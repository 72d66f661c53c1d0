//! Tracing-backed notification sink
//!
//! Bridges the scheduler's lifecycle seam onto structured log lines.
//! Deployments that ship metrics or alerting attach their own sink next
//! to (or instead of) this one.

use std::time::Duration;

use chronarc_core::{Event, NotificationSink, SchedulerError};
use tracing::{error, info};

/// Logs the four task lifecycle events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn task_starting(&self, event: &Event) {
        info!(
            task = %event.summary_for_display(),
            background = event.is_background(),
            "Scheduled task starting"
        );
    }

    fn task_finished(&self, event: &Event, runtime: Duration) {
        info!(
            task = %event.summary_for_display(),
            runtime_secs = format_args!("{:.2}", runtime.as_secs_f64()),
            exit_code = ?event.exit_code(),
            "Scheduled task finished"
        );
    }

    fn task_skipped(&self, event: &Event) {
        info!(task = %event.summary_for_display(), "Scheduled task skipped");
    }

    fn task_failed(&self, event: &Event, task_error: &SchedulerError) {
        error!(
            task = %event.summary_for_display(),
            error = %task_error,
            "Scheduled task failed"
        );
    }
}
