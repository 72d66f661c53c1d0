//! The schedulable unit and its run/finish state machine
//!
//! An [`Event`] owns its frequency state, filters, callbacks, and mutex
//! policy. Shell events spawn an external process through the
//! [`ProcessSpawner`](super::ports::ProcessSpawner) port; callback events
//! invoke an in-process async closure. The lifecycle is
//! *Idle → (mutex check) → Running → Finished*; an error exit is part of
//! Finished (non-zero exit code), not a distinct state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use chronarc_common::time::CronExpression;
use chronarc_domain::constants::{DEFAULT_CRON_EXPRESSION, DEFAULT_MUTEX_EXPIRY_MINUTES};
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::command_builder::{build_command, CommandSpec, Platform};
use super::error::{SchedulerError, SchedulerResult};
use super::ports::{EventMutex, ProcessHandle, ProcessSpawner, ProcessStatus};

/// Future returned by a scheduled callback
pub type TaskFuture = BoxFuture<'static, SchedulerResult<()>>;

/// An in-process callable payload
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Filter/reject predicate, re-evaluated on every due check
pub type FilterPredicate = Arc<dyn Fn(DateTime<Utc>) -> bool + Send + Sync>;

/// Before/after hook
pub type Hook = Arc<dyn Fn(&HookContext) + Send + Sync>;

/// What an event executes when it runs
#[derive(Clone)]
pub enum EventPayload {
    /// Spawn a shell command through the process port
    Shell {
        /// Fully compiled command line (parameters already rendered)
        command: String,
    },
    /// Invoke an in-process async closure
    Callback {
        /// The callable; errors are captured and surfaced after cleanup
        callback: TaskFn,
    },
}

/// Context handed to before/after hooks
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Exit code of the execution; `None` for before-hooks
    pub exit_code: Option<i32>,
    /// Where the event's output is redirected
    pub output: PathBuf,
    /// Human-readable event description, when set
    pub description: Option<String>,
}

/// Environment an event runs against
#[derive(Clone)]
pub struct RunContext {
    /// Process factory for shell events
    pub spawner: Arc<dyn ProcessSpawner>,
    /// Working directory for spawned processes
    pub base_path: PathBuf,
    /// Max runtime enforced on pooled processes
    pub process_timeout: Option<Duration>,
    /// Whether the host application is in maintenance mode
    pub maintenance_mode: bool,
}

/// Result of one `run` call
///
/// `Skipped` (overlap mutex held elsewhere) is a normal outcome, not an
/// error; genuine failures come back as `Err` so callers cannot conflate
/// the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another instance holds the overlap mutex; nothing ran
    Skipped,
    /// Foreground or callback execution completed with this exit code
    Completed {
        /// Process or callback exit code (callback errors map to 1)
        exit_code: i32,
    },
    /// Background execution started; completion is reconciled later by the
    /// pool runner, or never for plain background events
    Started,
}

enum Execution {
    Finished(i32),
    InFlight,
}

/// A scheduled unit of work
pub struct Event {
    payload: EventPayload,
    pub(crate) expression: String,
    pub(crate) repeat_seconds: Option<u32>,
    pub(crate) timezone: Option<Tz>,
    user: Option<String>,
    description: Option<String>,
    even_in_maintenance_mode: bool,
    without_overlapping: bool,
    on_one_server: bool,
    run_in_background: bool,
    pool: bool,
    mutex_expiry_minutes: u64,
    output: PathBuf,
    should_append_output: bool,
    pub(crate) filters: Vec<FilterPredicate>,
    pub(crate) rejects: Vec<FilterPredicate>,
    before_callbacks: Vec<Hook>,
    after_callbacks: Vec<Hook>,
    mutex: Arc<dyn EventMutex>,
    mutex_name_resolver: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    last_checked: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    captured_error: Option<SchedulerError>,
    process: Option<Box<dyn ProcessHandle>>,
}

impl Event {
    /// Create a process-backed event
    pub fn new_shell(
        mutex: Arc<dyn EventMutex>,
        command: impl Into<String>,
        timezone: Option<Tz>,
    ) -> Self {
        Self::new(EventPayload::Shell { command: command.into() }, mutex, timezone)
    }

    /// Create a callback-backed event
    pub fn new_callback(mutex: Arc<dyn EventMutex>, callback: TaskFn, timezone: Option<Tz>) -> Self {
        Self::new(EventPayload::Callback { callback }, mutex, timezone)
    }

    fn new(payload: EventPayload, mutex: Arc<dyn EventMutex>, timezone: Option<Tz>) -> Self {
        Self {
            payload,
            expression: DEFAULT_CRON_EXPRESSION.to_string(),
            repeat_seconds: None,
            timezone,
            user: None,
            description: None,
            even_in_maintenance_mode: false,
            without_overlapping: false,
            on_one_server: false,
            run_in_background: false,
            pool: false,
            mutex_expiry_minutes: DEFAULT_MUTEX_EXPIRY_MINUTES,
            output: default_output(),
            should_append_output: false,
            filters: Vec::new(),
            rejects: Vec::new(),
            before_callbacks: Vec::new(),
            after_callbacks: Vec::new(),
            mutex,
            mutex_name_resolver: None,
            last_checked: None,
            exit_code: None,
            captured_error: None,
            process: None,
        }
    }

    // --- fluent configuration -------------------------------------------

    /// Run the command as the given user (POSIX only)
    pub fn user(&mut self, user: impl Into<String>) -> &mut Self {
        self.user = Some(user.into());
        self
    }

    /// Set the human-friendly description of the event
    pub fn name(&mut self, description: impl Into<String>) -> &mut Self {
        self.description(description)
    }

    /// Set the human-friendly description of the event
    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// State that the event should run even in maintenance mode
    pub fn even_in_maintenance_mode(&mut self) -> &mut Self {
        self.even_in_maintenance_mode = true;
        self
    }

    /// Allow the event to only run on one server per cron expression
    pub fn on_one_server(&mut self) -> &mut Self {
        self.on_one_server = true;
        self
    }

    /// State that the command should run in the background
    pub fn run_in_background(&mut self) -> &mut Self {
        self.run_in_background = true;
        self
    }

    /// Do not allow the event to overlap itself (default 24h mutex)
    ///
    /// Callback events must be named first: the description is the mutex
    /// identity, so overlap protection without one is a configuration
    /// error, not silently ignored.
    pub fn without_overlapping(&mut self) -> SchedulerResult<&mut Self> {
        self.without_overlapping_for(DEFAULT_MUTEX_EXPIRY_MINUTES)
    }

    /// Overlap protection with an explicit mutex lifetime in minutes
    pub fn without_overlapping_for(&mut self, expires_minutes: u64) -> SchedulerResult<&mut Self> {
        if matches!(self.payload, EventPayload::Callback { .. }) && self.description.is_none() {
            return Err(SchedulerError::OverlapRequiresName);
        }
        self.without_overlapping = true;
        self.mutex_expiry_minutes = expires_minutes;
        Ok(self)
    }

    /// Register a filter: the event runs only when the predicate is true
    pub fn when<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(DateTime<Utc>) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(predicate));
        self
    }

    /// Register a reject: the event is held back when the predicate is true
    pub fn skip<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(DateTime<Utc>) -> bool + Send + Sync + 'static,
    {
        self.rejects.push(Arc::new(predicate));
        self
    }

    /// Register a hook to run before execution
    pub fn before<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.before_callbacks.push(Arc::new(hook));
        self
    }

    /// Register a hook to run after execution
    pub fn after<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.then(hook)
    }

    /// Register a hook to run after execution
    pub fn then<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.after_callbacks.push(Arc::new(hook));
        self
    }

    /// After-hook that only fires on exit code 0
    pub fn on_success<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.then(move |ctx| {
            if ctx.exit_code == Some(0) {
                hook(ctx);
            }
        })
    }

    /// After-hook that only fires on a non-zero exit code
    pub fn on_failure<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.then(move |ctx| {
            if ctx.exit_code.is_some_and(|code| code != 0) {
                hook(ctx);
            }
        })
    }

    /// Redirect combined stdout/stderr to the given location
    pub fn send_output_to(&mut self, location: impl Into<PathBuf>) -> &mut Self {
        self.output = location.into();
        self.should_append_output = false;
        self
    }

    /// Append combined stdout/stderr to the given location
    pub fn append_output_to(&mut self, location: impl Into<PathBuf>) -> &mut Self {
        self.output = location.into();
        self.should_append_output = true;
        self
    }

    /// Ensure output is captured somewhere inspectable
    ///
    /// When output still points at the null device, a capture file derived
    /// from the mutex name is placed in the system temp directory.
    pub fn store_output(&mut self) -> &mut Self {
        if self.output == default_output() {
            let file = format!("chronarc-schedule-{}.log", sha256_hex(&self.mutex_name()));
            self.output = std::env::temp_dir().join(file);
        }
        self
    }

    /// Override the mutex identity with a fixed name or resolver
    pub fn create_mutex_name_using<F>(&mut self, resolver: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.mutex_name_resolver = Some(Arc::new(resolver));
        self
    }

    pub(crate) fn mark_pooled(&mut self) {
        self.pool = true;
    }

    // --- accessors -------------------------------------------------------

    /// The event's 5-field cron expression
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Sub-minute repeat interval, when configured
    pub fn repeat_seconds(&self) -> Option<u32> {
        self.repeat_seconds
    }

    /// The compiled command line for shell events
    pub fn command(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Shell { command } => Some(command),
            EventPayload::Callback { .. } => None,
        }
    }

    /// Human-readable description, when set
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether `on_one_server` was requested
    pub fn is_on_one_server(&self) -> bool {
        self.on_one_server
    }

    /// Whether the event runs in the background
    pub fn is_background(&self) -> bool {
        self.run_in_background
    }

    /// Whether the event has been admitted to the pool
    pub fn is_pooled(&self) -> bool {
        self.pool
    }

    /// Whether the event is exempt from maintenance-mode holds
    pub fn runs_in_maintenance_mode(&self) -> bool {
        self.even_in_maintenance_mode
    }

    /// Overlap-mutex lifetime in minutes
    pub fn mutex_expiry_minutes(&self) -> u64 {
        self.mutex_expiry_minutes
    }

    /// Exit code of the most recent completed execution
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether this is a callback-backed event
    pub fn is_callback(&self) -> bool {
        matches!(self.payload, EventPayload::Callback { .. })
    }

    /// Mutex identity: stable for the event's lifetime unless overridden
    pub fn mutex_name(&self) -> String {
        if let Some(resolver) = &self.mutex_name_resolver {
            return resolver();
        }
        match &self.payload {
            EventPayload::Shell { command } => {
                format!("chronarc/schedule-{}", sha256_hex(&format!("{}{}", self.expression, command)))
            }
            EventPayload::Callback { .. } => {
                format!("schedule-{}", sha256_hex(self.description.as_deref().unwrap_or_default()))
            }
        }
    }

    /// Display label: the description, else the command line or "Callback"
    pub fn summary_for_display(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match &self.payload {
            EventPayload::Shell { .. } => self.build_command().unwrap_or_default(),
            EventPayload::Callback { .. } => "Callback".to_string(),
        }
    }

    /// Render the full platform-specific command line (shell events only)
    pub fn build_command(&self) -> Option<String> {
        let command = self.command()?;
        let spec = CommandSpec {
            command,
            output: &self.output,
            append: self.should_append_output,
            background: self.run_in_background,
            user: self.user.as_deref(),
        };
        Some(build_command(&spec, Platform::current()))
    }

    // --- due evaluation --------------------------------------------------

    /// Whether the event is due at `now`
    ///
    /// Maintenance mode holds back every event that has not opted in via
    /// `even_in_maintenance_mode`; otherwise the cron expression must match
    /// `now` in the event's timezone at minute granularity.
    pub fn is_due(&self, now: DateTime<Utc>, maintenance_mode: bool) -> bool {
        if maintenance_mode && !self.even_in_maintenance_mode {
            return false;
        }
        self.expression_passes(now)
    }

    fn expression_passes(&self, now: DateTime<Utc>) -> bool {
        let Ok(cron) = CronExpression::parse(&self.expression) else {
            return false;
        };
        match self.timezone {
            Some(tz) => cron.matches(&now.with_timezone(&tz)),
            None => cron.matches(&now),
        }
    }

    /// Next due time after `now`, in the event's timezone
    pub fn next_run_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cron = CronExpression::parse(&self.expression).ok()?;
        match self.timezone {
            Some(tz) => cron.next_after(&now.with_timezone(&tz)).map(|dt| dt.with_timezone(&Utc)),
            None => cron.next_after(&now),
        }
    }

    /// Evaluate filters and rejects, stamping `last_checked`
    ///
    /// An existing overlap mutex fails the check (the overlap skip is a
    /// reject in spirit: it is re-evaluated on every tick, not only at
    /// acquisition time).
    pub async fn filters_pass(&mut self, now: DateTime<Utc>) -> SchedulerResult<bool> {
        self.last_checked = Some(now);

        if self.without_overlapping {
            let mutex = Arc::clone(&self.mutex);
            if mutex.exists(self).await? {
                return Ok(false);
            }
        }
        for filter in &self.filters {
            if !filter(now) {
                return Ok(false);
            }
        }
        for reject in &self.rejects {
            if reject(now) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether the event repeats multiple times per minute
    pub fn is_repeatable(&self) -> bool {
        self.repeat_seconds.is_some()
    }

    /// Whether the repeat interval has elapsed since the last check
    pub fn should_repeat_now(&self, now: DateTime<Utc>) -> bool {
        match (self.repeat_seconds, self.last_checked) {
            (Some(seconds), Some(checked)) => (now - checked).num_seconds() >= i64::from(seconds),
            _ => false,
        }
    }

    // --- run/finish state machine ---------------------------------------

    /// Run the event once
    ///
    /// Overlap contention returns `RunOutcome::Skipped` without touching
    /// callbacks. A failure anywhere in the execution path releases the
    /// overlap mutex before the error is surfaced, and callback errors are
    /// surfaced only after finalization has run exactly once.
    pub async fn run(&mut self, ctx: &RunContext) -> SchedulerResult<RunOutcome> {
        if self.should_skip_due_to_overlapping().await? {
            return Ok(RunOutcome::Skipped);
        }

        self.captured_error = None;

        let ctx_for_hooks = self.hook_context(None);
        for hook in &self.before_callbacks {
            hook(&ctx_for_hooks);
        }

        let execution = match self.execute(ctx).await {
            Ok(execution) => execution,
            Err(err) => {
                self.release_mutex_best_effort().await;
                return Err(err);
            }
        };

        match execution {
            Execution::Finished(exit_code) if !self.run_in_background => {
                self.finish(exit_code).await?;
                match self.captured_error.take() {
                    Some(err) => Err(err),
                    None => Ok(RunOutcome::Completed { exit_code }),
                }
            }
            Execution::Finished(exit_code) => {
                // Plain background: the wrapping shell already returned; the
                // child's real exit code is never reconciled.
                self.exit_code = Some(exit_code);
                Ok(RunOutcome::Started)
            }
            Execution::InFlight => Ok(RunOutcome::Started),
        }
    }

    /// Mark a deferred (pooled) execution as finished
    ///
    /// Runs after-callbacks and releases the overlap mutex. The mutex
    /// release is unconditional: it happens even when an after-callback
    /// misbehaves, because hooks are infallible by construction.
    pub async fn finish(&mut self, exit_code: i32) -> SchedulerResult<()> {
        self.exit_code = Some(exit_code);
        let ctx = self.hook_context(Some(exit_code));
        for hook in &self.after_callbacks {
            hook(&ctx);
        }
        self.remove_mutex().await
    }

    /// Poll the attached background process (pool mode)
    ///
    /// Applies timeout enforcement, then reports liveness. A finished
    /// process is detached and its exit code recorded.
    pub fn check_process(&mut self) -> SchedulerResult<ProcessStatus> {
        let Some(process) = self.process.as_mut() else {
            return Ok(ProcessStatus::NoProcess);
        };
        process.check_timeout()?;
        if process.is_running()? {
            return Ok(ProcessStatus::Running);
        }
        let exit_code = process.exit_code().unwrap_or(0);
        self.process = None;
        self.exit_code = Some(exit_code);
        Ok(ProcessStatus::Finished(exit_code))
    }

    async fn should_skip_due_to_overlapping(&mut self) -> SchedulerResult<bool> {
        if !self.without_overlapping {
            return Ok(false);
        }
        let mutex = Arc::clone(&self.mutex);
        Ok(!mutex.create(self).await?)
    }

    async fn execute(&mut self, ctx: &RunContext) -> SchedulerResult<Execution> {
        if let EventPayload::Callback { callback } = &self.payload {
            let callback = Arc::clone(callback);
            return match callback().await {
                Ok(()) => Ok(Execution::Finished(0)),
                Err(err) => {
                    self.captured_error = Some(err);
                    Ok(Execution::Finished(1))
                }
            };
        }

        let command_line =
            self.build_command().ok_or_else(|| SchedulerError::Process("no command".into()))?;
        let mut handle = ctx.spawner.spawn(&command_line, &ctx.base_path, ctx.process_timeout)?;
        if self.pool {
            handle.start().await?;
            self.process = Some(handle);
            Ok(Execution::InFlight)
        } else {
            let exit_code = handle.run().await?;
            Ok(Execution::Finished(exit_code))
        }
    }

    async fn remove_mutex(&mut self) -> SchedulerResult<()> {
        if self.without_overlapping {
            let mutex = Arc::clone(&self.mutex);
            mutex.forget(self).await?;
        }
        Ok(())
    }

    async fn release_mutex_best_effort(&mut self) {
        if let Err(err) = self.remove_mutex().await {
            warn!(error = %err, event = %self.summary_for_display(), "Failed to release overlap mutex");
        }
    }

    fn hook_context(&self, exit_code: Option<i32>) -> HookContext {
        HookContext {
            exit_code,
            output: self.output.clone(),
            description: self.description.clone(),
        }
    }

    /// Where the event's output is redirected
    pub fn output_path(&self) -> &Path {
        &self.output
    }
}

fn default_output() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("NUL")
    } else {
        PathBuf::from("/dev/null")
    }
}

pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    use super::*;
    use crate::scheduling::ports::ProcessSpawner;

    /// Event mutex fake with scriptable acquisition and call counters.
    struct FakeEventMutex {
        grant: bool,
        held: bool,
        creates: AtomicUsize,
        forgets: AtomicUsize,
    }

    impl FakeEventMutex {
        fn granting() -> Arc<Self> {
            Arc::new(Self {
                grant: true,
                held: false,
                creates: AtomicUsize::new(0),
                forgets: AtomicUsize::new(0),
            })
        }

        fn contended() -> Arc<Self> {
            Arc::new(Self {
                grant: false,
                held: true,
                creates: AtomicUsize::new(0),
                forgets: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EventMutex for FakeEventMutex {
        async fn create(&self, _event: &Event) -> SchedulerResult<bool> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(self.grant)
        }

        async fn exists(&self, _event: &Event) -> SchedulerResult<bool> {
            Ok(self.held)
        }

        async fn forget(&self, _event: &Event) -> SchedulerResult<()> {
            self.forgets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StaticProcess {
        exit_code: i32,
    }

    #[async_trait]
    impl ProcessHandle for StaticProcess {
        async fn start(&mut self) -> SchedulerResult<()> {
            Ok(())
        }

        async fn run(&mut self) -> SchedulerResult<i32> {
            Ok(self.exit_code)
        }

        fn is_running(&mut self) -> SchedulerResult<bool> {
            Ok(false)
        }

        fn exit_code(&mut self) -> Option<i32> {
            Some(self.exit_code)
        }

        fn check_timeout(&mut self) -> SchedulerResult<()> {
            Ok(())
        }

        fn read_incremental_output(&mut self) -> String {
            String::new()
        }

        fn read_incremental_error_output(&mut self) -> String {
            String::new()
        }
    }

    struct StaticSpawner {
        exit_code: i32,
        fail: bool,
    }

    impl ProcessSpawner for StaticSpawner {
        fn spawn(
            &self,
            _command_line: &str,
            _working_dir: &Path,
            _timeout: Option<Duration>,
        ) -> SchedulerResult<Box<dyn ProcessHandle>> {
            if self.fail {
                return Err(SchedulerError::Process("spawn refused".into()));
            }
            Ok(Box::new(StaticProcess { exit_code: self.exit_code }))
        }
    }

    fn run_context(exit_code: i32, fail: bool) -> RunContext {
        RunContext {
            spawner: Arc::new(StaticSpawner { exit_code, fail }),
            base_path: std::env::temp_dir(),
            process_timeout: None,
            maintenance_mode: false,
        }
    }

    fn callback_event(mutex: Arc<dyn EventMutex>, result: SchedulerResult<()>) -> Event {
        let result = Arc::new(Mutex::new(Some(result)));
        let task: TaskFn = Arc::new(move || -> TaskFuture {
            let result = Arc::clone(&result);
            Box::pin(async move { result.lock().take().unwrap_or(Ok(())) })
        });
        Event::new_callback(mutex, task, None)
    }

    #[tokio::test]
    async fn overlap_contention_skips_without_callbacks() {
        let mutex = FakeEventMutex::contended();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut event = callback_event(Arc::clone(&mutex) as Arc<dyn EventMutex>, Ok(()));
        let before_fired = Arc::clone(&fired);
        event.name("guarded").without_overlapping().unwrap();
        event.before(move |_ctx| {
            before_fired.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = event.run(&run_context(0, false)).await.unwrap();

        assert_eq!(outcome, RunOutcome::Skipped);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // The losing acquire must not release the winner's mutex
        assert_eq!(mutex.forgets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn callback_success_fires_hooks_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut event = callback_event(FakeEventMutex::granting() as Arc<dyn EventMutex>, Ok(()));

        let trace = Arc::clone(&order);
        event.before(move |_ctx| trace.lock().push("before"));
        let trace = Arc::clone(&order);
        event.then(move |ctx| {
            assert_eq!(ctx.exit_code, Some(0));
            trace.lock().push("after");
        });
        let trace = Arc::clone(&order);
        event.on_success(move |_ctx| trace.lock().push("success"));
        let trace = Arc::clone(&order);
        event.on_failure(move |_ctx| trace.lock().push("failure"));

        let outcome = event.run(&run_context(0, false)).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed { exit_code: 0 });
        assert_eq!(*order.lock(), vec!["before", "after", "success"]);
    }

    #[tokio::test]
    async fn callback_failure_surfaces_after_cleanup() {
        let mutex = FakeEventMutex::granting();
        let failures = Arc::new(AtomicUsize::new(0));
        let mut event = callback_event(
            Arc::clone(&mutex) as Arc<dyn EventMutex>,
            Err(SchedulerError::Callback("boom".into())),
        );
        event.name("failing-job").without_overlapping().unwrap();
        let seen = Arc::clone(&failures);
        event.on_failure(move |ctx| {
            assert_eq!(ctx.exit_code, Some(1));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let result = event.run(&run_context(0, false)).await;

        assert!(matches!(result, Err(SchedulerError::Callback(_))));
        // Finalization ran exactly once before the error surfaced
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(event.exit_code(), Some(1));
        assert_eq!(mutex.forgets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spawn_failure_releases_the_mutex() {
        let mutex = FakeEventMutex::granting();
        let mut event =
            Event::new_shell(Arc::clone(&mutex) as Arc<dyn EventMutex>, "echo hi", None);
        event.without_overlapping().unwrap();

        let result = event.run(&run_context(0, true)).await;

        assert!(matches!(result, Err(SchedulerError::Process(_))));
        assert_eq!(mutex.creates.load(Ordering::SeqCst), 1);
        assert_eq!(mutex.forgets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn foreground_shell_completes_with_exit_code() {
        let mut event = Event::new_shell(FakeEventMutex::granting(), "false", None);
        let outcome = event.run(&run_context(3, false)).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { exit_code: 3 });
        assert_eq!(event.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn background_shell_defers_finalization() {
        let mutex = FakeEventMutex::granting();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut event =
            Event::new_shell(Arc::clone(&mutex) as Arc<dyn EventMutex>, "sleep 60", None);
        event.without_overlapping().unwrap().run_in_background();
        let seen = Arc::clone(&fired);
        event.then(move |_ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = event.run(&run_context(0, false)).await.unwrap();

        // Completion is never reconciled for plain background events: no
        // after-callbacks, and the mutex stays held until its TTL lapses.
        assert_eq!(outcome, RunOutcome::Started);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(mutex.forgets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pooled_shell_finishes_when_reaped() {
        let mutex = FakeEventMutex::granting();
        let mut event =
            Event::new_shell(Arc::clone(&mutex) as Arc<dyn EventMutex>, "work", None);
        event.without_overlapping().unwrap();
        event.mark_pooled();

        let outcome = event.run(&run_context(0, false)).await.unwrap();
        assert_eq!(outcome, RunOutcome::Started);
        assert_eq!(mutex.forgets.load(Ordering::SeqCst), 0);

        let status = event.check_process().unwrap();
        assert_eq!(status, ProcessStatus::Finished(0));

        event.finish(0).await.unwrap();
        assert_eq!(event.exit_code(), Some(0));
        assert_eq!(mutex.forgets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn without_overlapping_requires_a_name_on_callback_events() {
        let mut event = callback_event(FakeEventMutex::granting(), Ok(()));
        let result = event.without_overlapping();
        assert!(matches!(result, Err(SchedulerError::OverlapRequiresName)));

        event.name("now-named");
        assert!(event.without_overlapping().is_ok());
    }

    #[test]
    fn shell_events_do_not_need_a_name_for_overlap_protection() {
        let mut event = Event::new_shell(FakeEventMutex::granting(), "echo hi", None);
        assert!(event.without_overlapping_for(30).is_ok());
        assert_eq!(event.mutex_expiry_minutes(), 30);
    }

    #[test]
    fn mutex_name_is_stable_and_tracks_identity() {
        let mutex = FakeEventMutex::granting();
        let mut event =
            Event::new_shell(Arc::clone(&mutex) as Arc<dyn EventMutex>, "echo hi", None);
        let name = event.mutex_name();
        assert_eq!(name, event.mutex_name());
        assert!(name.starts_with("chronarc/schedule-"));

        // A different expression yields a different identity
        event.hourly();
        assert_ne!(name, event.mutex_name());

        // An explicit resolver overrides the digest entirely
        event.create_mutex_name_using(|| "fixed-name".to_string());
        assert_eq!(event.mutex_name(), "fixed-name");
    }

    #[test]
    fn callback_mutex_name_derives_from_description() {
        let mutex = FakeEventMutex::granting();
        let mut a = callback_event(Arc::clone(&mutex) as Arc<dyn EventMutex>, Ok(()));
        let mut b = callback_event(Arc::clone(&mutex) as Arc<dyn EventMutex>, Ok(()));
        a.name("same");
        b.name("same");
        assert_eq!(a.mutex_name(), b.mutex_name());
        b.name("different");
        assert_ne!(a.mutex_name(), b.mutex_name());
    }

    #[tokio::test]
    async fn filters_pass_checks_overlap_then_filters_then_rejects() {
        let mut event = callback_event(FakeEventMutex::granting(), Ok(()));
        event.when(|_now| true).skip(|_now| false);
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap();
        assert!(event.filters_pass(now).await.unwrap());

        event.skip(|_now| true);
        assert!(!event.filters_pass(now).await.unwrap());

        // An existing overlap mutex fails the check before any predicate
        let mut held = callback_event(FakeEventMutex::contended(), Ok(()));
        held.name("held").without_overlapping().unwrap();
        assert!(!held.filters_pass(now).await.unwrap());
    }

    #[test]
    fn should_repeat_now_tracks_last_checked() {
        let mut event = callback_event(FakeEventMutex::granting(), Ok(()));
        event.every_ten_seconds();
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap();

        // Never checked yet: nothing to measure against
        assert!(!event.should_repeat_now(now));

        futures::executor::block_on(event.filters_pass(now)).unwrap();
        assert!(!event.should_repeat_now(now + chrono::Duration::seconds(5)));
        assert!(event.should_repeat_now(now + chrono::Duration::seconds(10)));
    }
}
