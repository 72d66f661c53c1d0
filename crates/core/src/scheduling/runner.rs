//! The execution driver
//!
//! One logical scheduler task drives evaluation and dispatch. For each due
//! event the runner checks filters, applies single-server election, and
//! runs the event once, repeatedly within the current minute (sub-minute
//! events), or under a bounded worker pool with cooperative polling.
//! A single event's failure never prevents its siblings from running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use chronarc_common::time::Clock;
use chronarc_domain::constants::{POOL_POLL_INTERVAL_MS, REPEAT_POLL_INTERVAL_MS};
use tracing::{debug, error, info, warn};

use super::error::SchedulerResult;
use super::event::{Event, RunContext, RunOutcome};
use super::notifications::NotificationSink;
use super::ports::ProcessStatus;
use super::schedule::Schedule;

/// Counters for one tick, so callers can report what happened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Events that ran (including background starts)
    pub ran: usize,
    /// Events held back by filters, overlap, or another server
    pub skipped: usize,
    /// Events that failed with a genuine error
    pub failed: usize,
}

impl TickSummary {
    /// True when nothing ran, failed, or was skipped
    pub fn is_empty(&self) -> bool {
        self.ran == 0 && self.skipped == 0 && self.failed == 0
    }
}

/// Runner tuning knobs
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Sleep between sub-minute repeat checks
    pub repeat_poll_interval: Duration,
    /// Sleep between pool poll cycles
    pub pool_poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repeat_poll_interval: Duration::from_millis(REPEAT_POLL_INTERVAL_MS),
            pool_poll_interval: Duration::from_millis(POOL_POLL_INTERVAL_MS),
        }
    }
}

struct InFlight {
    index: usize,
    started: Instant,
}

struct PoolState {
    due: Vec<usize>,
    cursor: usize,
    running: Vec<InFlight>,
}

impl PoolState {
    fn has_pending(&self) -> bool {
        self.cursor < self.due.len()
    }
}

/// Drives scheduler ticks against a [`Schedule`]
pub struct ScheduleRunner {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    ctx: RunContext,
    config: RunnerConfig,
}

impl ScheduleRunner {
    /// Create a runner with the default configuration
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn NotificationSink>, ctx: RunContext) -> Self {
        Self { clock, notifier, ctx, config: RunnerConfig::default() }
    }

    /// Override the runner configuration
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Evaluate and execute every due event once
    ///
    /// Events run in registration order. Sub-minute events busy-poll until
    /// the end of the tick's start minute.
    pub async fn run_tick(&self, schedule: &mut Schedule) -> SchedulerResult<TickSummary> {
        let started_at = self.clock.now_utc();
        schedule.reset_tick_cache();
        let due = schedule.due_indices(started_at, self.ctx.maintenance_mode);
        let mut summary = TickSummary::default();

        for index in due {
            let now = self.clock.now_utc();
            if !schedule.event_mut(index).filters_pass(now).await? {
                self.notifier.task_skipped(&schedule.events()[index]);
                summary.skipped += 1;
                continue;
            }
            if schedule.events()[index].is_on_one_server() {
                self.run_single_server_event(schedule, index, started_at, &mut summary).await?;
            } else if schedule.events()[index].is_repeatable() {
                self.repeat_events(schedule, index, started_at, &mut summary).await?;
            } else {
                self.run_event(schedule.event_mut(index), &mut summary).await;
            }
        }

        Ok(summary)
    }

    /// Run due events under a bounded worker pool
    ///
    /// Fills up to `size` in-flight background processes from the due
    /// sequence, then polls each for timeout and completion, reaping
    /// finished ones and refilling freed slots. Capacity is the only
    /// backpressure signal.
    pub async fn run_pool(&self, schedule: &mut Schedule, size: usize) -> SchedulerResult<TickSummary> {
        let started_at = self.clock.now_utc();
        schedule.reset_tick_cache();
        let size = size.max(1);
        let mut pool = PoolState {
            due: schedule.due_indices(started_at, self.ctx.maintenance_mode),
            cursor: 0,
            running: Vec::with_capacity(size),
        };
        let mut summary = TickSummary::default();

        self.start_next_processes(schedule, &mut pool, size, started_at, &mut summary).await?;

        while !pool.running.is_empty() {
            let mut slot = 0;
            while slot < pool.running.len() {
                let index = pool.running[slot].index;
                match schedule.event_mut(index).check_process() {
                    Ok(ProcessStatus::Running) => {
                        slot += 1;
                    }
                    Ok(status) => {
                        let exit_code = match status {
                            ProcessStatus::Finished(code) => code,
                            _ => schedule.events()[index].exit_code().unwrap_or(0),
                        };
                        let started = pool.running[slot].started;
                        pool.running.swap_remove(slot);
                        if let Err(finish_err) = schedule.event_mut(index).finish(exit_code).await {
                            warn!(
                                event = %schedule.events()[index].summary_for_display(),
                                error = %finish_err,
                                "Cleanup after pooled run failed"
                            );
                        }
                        self.notifier.task_finished(&schedule.events()[index], started.elapsed());
                        summary.ran += 1;
                        self.start_next_processes(schedule, &mut pool, size, started_at, &mut summary)
                            .await?;
                    }
                    Err(poll_err) => {
                        error!(
                            event = %schedule.events()[index].summary_for_display(),
                            error = %poll_err,
                            "Pooled process failed"
                        );
                        self.notifier.task_failed(&schedule.events()[index], &poll_err);
                        pool.running.swap_remove(slot);
                        if let Err(finish_err) = schedule.event_mut(index).finish(1).await {
                            warn!(
                                event = %schedule.events()[index].summary_for_display(),
                                error = %finish_err,
                                "Cleanup after failed pooled run failed"
                            );
                        }
                        summary.failed += 1;
                        self.start_next_processes(schedule, &mut pool, size, started_at, &mut summary)
                            .await?;
                    }
                }
            }
            if !pool.running.is_empty() || pool.has_pending() {
                tokio::time::sleep(self.config.pool_poll_interval).await;
            }
        }

        Ok(summary)
    }

    async fn start_next_processes(
        &self,
        schedule: &mut Schedule,
        pool: &mut PoolState,
        size: usize,
        started_at: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> SchedulerResult<()> {
        while pool.running.len() < size && pool.has_pending() {
            let index = pool.due[pool.cursor];
            pool.cursor += 1;

            let now = self.clock.now_utc();
            if !schedule.event_mut(index).filters_pass(now).await? {
                self.notifier.task_skipped(&schedule.events()[index]);
                summary.skipped += 1;
                continue;
            }
            if schedule.events()[index].is_on_one_server()
                && !schedule.server_should_run(index, started_at).await?
            {
                info!(
                    event = %schedule.events()[index].summary_for_display(),
                    "Skipping, as command already run on another server"
                );
                summary.skipped += 1;
                continue;
            }
            if schedule.events()[index].is_repeatable() {
                // Sub-minute events cannot be parked in the pool; they run
                // their minute out inline before the fill continues.
                self.repeat_events(schedule, index, started_at, summary).await?;
                continue;
            }

            schedule.event_mut(index).mark_pooled();
            self.notifier.task_starting(&schedule.events()[index]);
            let started = Instant::now();
            match schedule.event_mut(index).run(&self.ctx).await {
                Ok(RunOutcome::Started) => {
                    pool.running.push(InFlight { index, started });
                }
                Ok(RunOutcome::Completed { .. }) => {
                    // Callback events complete synchronously even when pooled
                    self.notifier.task_finished(&schedule.events()[index], started.elapsed());
                    summary.ran += 1;
                }
                Ok(RunOutcome::Skipped) => {
                    debug!(
                        event = %schedule.events()[index].summary_for_display(),
                        "Skipping, overlap mutex is held"
                    );
                    summary.skipped += 1;
                }
                Err(run_err) => {
                    error!(
                        event = %schedule.events()[index].summary_for_display(),
                        error = %run_err,
                        "Scheduled task failed"
                    );
                    self.notifier.task_failed(&schedule.events()[index], &run_err);
                    summary.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn run_single_server_event(
        &self,
        schedule: &mut Schedule,
        index: usize,
        time: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> SchedulerResult<()> {
        if schedule.server_should_run(index, time).await? {
            self.run_event(schedule.event_mut(index), summary).await;
        } else {
            info!(
                event = %schedule.events()[index].summary_for_display(),
                "Skipping, as command already run on another server"
            );
            summary.skipped += 1;
        }
        Ok(())
    }

    /// Poll a sub-minute event until the tick's start minute runs out
    async fn repeat_events(
        &self,
        schedule: &mut Schedule,
        index: usize,
        started_at: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> SchedulerResult<()> {
        let minute_end = minute_boundary(started_at);
        loop {
            let now = self.clock.now_utc();
            if now >= minute_end {
                break;
            }
            if schedule.events()[index].should_repeat_now(now) {
                let held_by_maintenance = self.ctx.maintenance_mode
                    && !schedule.events()[index].runs_in_maintenance_mode();
                if !held_by_maintenance {
                    if !schedule.event_mut(index).filters_pass(now).await? {
                        self.notifier.task_skipped(&schedule.events()[index]);
                        summary.skipped += 1;
                    } else if schedule.events()[index].is_on_one_server() {
                        self.run_single_server_event(schedule, index, started_at, summary).await?;
                    } else {
                        self.run_event(schedule.event_mut(index), summary).await;
                    }
                }
            }
            tokio::time::sleep(self.config.repeat_poll_interval).await;
        }
        Ok(())
    }

    async fn run_event(&self, event: &mut Event, summary: &mut TickSummary) {
        self.notifier.task_starting(event);
        let started = Instant::now();
        match event.run(&self.ctx).await {
            Ok(RunOutcome::Skipped) => {
                debug!(event = %event.summary_for_display(), "Skipping, overlap mutex is held");
                summary.skipped += 1;
            }
            Ok(RunOutcome::Completed { exit_code }) => {
                self.notifier.task_finished(event, started.elapsed());
                if exit_code != 0 {
                    warn!(
                        event = %event.summary_for_display(),
                        exit_code,
                        "Scheduled task exited non-zero"
                    );
                }
                summary.ran += 1;
            }
            Ok(RunOutcome::Started) => {
                // Plain background events are done from the scheduler's
                // perspective the moment the shell takes them.
                self.notifier.task_finished(event, started.elapsed());
                summary.ran += 1;
            }
            Err(run_err) => {
                error!(
                    event = %event.summary_for_display(),
                    error = %run_err,
                    "Scheduled task failed"
                );
                self.notifier.task_failed(event, &run_err);
                summary.failed += 1;
            }
        }
    }
}

/// First instant past the minute `started_at` falls in
fn minute_boundary(started_at: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = started_at
        - chrono::Duration::seconds(i64::from(started_at.second()))
        - chrono::Duration::nanoseconds(i64::from(started_at.nanosecond()));
    truncated + chrono::Duration::minutes(1)
}
