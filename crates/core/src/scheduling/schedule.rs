//! The event registry and its factory methods
//!
//! A `Schedule` owns the ordered set of events for one scheduling
//! definition, the mutex providers, and the per-tick memo of
//! single-server election results. It is constructed explicitly at
//! process start and threaded through the runner and CLI handlers;
//! there is no process-wide registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::command_builder::{escape_argument, Platform};
use super::error::{SchedulerError, SchedulerResult};
use super::event::{Event, TaskFn, TaskFuture};
use super::ports::{EventMutex, Queue, ScheduledJob, SchedulingMutex};

/// One compiled command parameter
///
/// Mirrors the three shapes parameter maps take: bare positional values,
/// `key=value` pairs, and array values expanding to repeated flags.
#[derive(Debug, Clone)]
pub enum ScheduleParam {
    /// Bare value appended as-is (escaped unless numeric or flag-shaped)
    Value(String),
    /// Named parameter rendered as `key=value`
    Pair(String, String),
    /// Array value: one `key=value` (or `-k value`) token per element
    Repeated(String, Vec<String>),
}

/// The registry of scheduled events
pub struct Schedule {
    events: Vec<Event>,
    event_mutex: Arc<dyn EventMutex>,
    scheduling_mutex: Arc<dyn SchedulingMutex>,
    default_queue: Option<Arc<dyn Queue>>,
    queue_connections: HashMap<String, Arc<dyn Queue>>,
    timezone: Option<Tz>,
    /// Single-server election memo, valid for one tick only
    mutex_cache: HashMap<String, bool>,
}

impl Schedule {
    /// Create a schedule backed by the given mutex providers
    pub fn new(event_mutex: Arc<dyn EventMutex>, scheduling_mutex: Arc<dyn SchedulingMutex>) -> Self {
        Self {
            events: Vec::new(),
            event_mutex,
            scheduling_mutex,
            default_queue: None,
            queue_connections: HashMap::new(),
            timezone: None,
            mutex_cache: HashMap::new(),
        }
    }

    /// Default timezone applied to events registered after this call
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    /// Queue used by `job` registrations without an explicit connection
    pub fn with_queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.default_queue = Some(queue);
        self
    }

    /// Register a named queue connection
    pub fn with_queue_connection(mut self, name: impl Into<String>, queue: Arc<dyn Queue>) -> Self {
        self.queue_connections.insert(name.into(), queue);
        self
    }

    // --- factories -------------------------------------------------------

    /// Register a raw shell command
    pub fn exec(&mut self, command: &str, parameters: &[ScheduleParam]) -> &mut Event {
        let mut command = command.trim().to_string();
        if !parameters.is_empty() {
            command.push(' ');
            command.push_str(&compile_parameters(parameters));
        }
        let event = Event::new_shell(Arc::clone(&self.event_mutex), command, self.timezone);
        self.events.push(event);
        let index = self.events.len() - 1;
        &mut self.events[index]
    }

    /// Register a console command of this binary
    ///
    /// The current executable is resolved and prepended, so the scheduled
    /// line re-enters the application like any other CLI invocation.
    pub fn command(&mut self, command: &str, parameters: &[ScheduleParam]) -> &mut Event {
        let binary = std::env::current_exe()
            .map(|path| escape_argument(&path.to_string_lossy(), Platform::current()))
            .unwrap_or_else(|_| "chronarc".to_string());
        let name = command.to_string();
        let event = self.exec(&format!("{} {}", binary, command), parameters);
        event.description(name)
    }

    /// Register an in-process async callback
    pub fn call<F, Fut>(&mut self, callback: F) -> &mut Event
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = SchedulerResult<()>> + Send + 'static,
    {
        let task: TaskFn = Arc::new(move || -> TaskFuture { Box::pin(callback()) });
        let event = Event::new_callback(Arc::clone(&self.event_mutex), task, self.timezone);
        self.events.push(event);
        let index = self.events.len() - 1;
        &mut self.events[index]
    }

    /// Register a job
    ///
    /// Whether the job is pushed to its queue or invoked inline is decided
    /// on every run from `ScheduledJob::should_queue`, so runtime state
    /// controls the routing. `queue` overrides the job's own queue name;
    /// `connection` selects a named queue connection.
    pub fn job(
        &mut self,
        job: Arc<dyn ScheduledJob>,
        queue: Option<&str>,
        connection: Option<&str>,
    ) -> &mut Event {
        let port = match connection {
            Some(name) => self.queue_connections.get(name).cloned(),
            None => self.default_queue.clone(),
        };
        let queue_override = queue.map(String::from);
        let name = job.name().to_string();

        let event = self.call(move || {
            let job = Arc::clone(&job);
            let port = port.clone();
            let queue_override = queue_override.clone();
            async move {
                if job.should_queue() {
                    let port = port.ok_or_else(|| {
                        SchedulerError::Queue(format!(
                            "no queue connection configured for job [{}]",
                            job.name()
                        ))
                    })?;
                    let queue_name = queue_override.as_deref().or_else(|| job.queue());
                    match job.delay() {
                        Some(delay) if !delay.is_zero() => {
                            port.later(delay, job.name(), job.payload(), queue_name).await
                        }
                        _ => port.push(job.name(), job.payload(), queue_name).await,
                    }
                } else {
                    job.handle().await
                }
            }
        });
        event.name(name)
    }

    // --- access ----------------------------------------------------------

    /// All events, in registration order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Mutable access to one event by index
    pub fn event_mut(&mut self, index: usize) -> &mut Event {
        &mut self.events[index]
    }

    /// Events whose cron expression matches `now`
    pub fn due_events(&self, now: DateTime<Utc>, maintenance_mode: bool) -> Vec<&Event> {
        self.events.iter().filter(|event| event.is_due(now, maintenance_mode)).collect()
    }

    /// Indices of due events, in registration order
    ///
    /// The runner works with indices so it can take events mutably one at
    /// a time while still consulting the schedule in between.
    pub fn due_indices(&self, now: DateTime<Utc>, maintenance_mode: bool) -> Vec<usize> {
        self.events
            .iter()
            .enumerate()
            .filter(|(_, event)| event.is_due(now, maintenance_mode))
            .map(|(index, _)| index)
            .collect()
    }

    // --- single-server election -----------------------------------------

    /// Determine if this server is allowed to run the event at `time`
    ///
    /// Race-to-acquire over the scheduling mutex: only the process that
    /// creates the per-minute key proceeds. Results are memoized per tick
    /// by mutex name to avoid redundant cache round-trips for repeated
    /// events.
    pub async fn server_should_run(
        &mut self,
        index: usize,
        time: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let name = self.events[index].mutex_name();
        if let Some(cached) = self.mutex_cache.get(&name) {
            return Ok(*cached);
        }
        let acquired = self.scheduling_mutex.create(&self.events[index], time).await?;
        self.mutex_cache.insert(name, acquired);
        Ok(acquired)
    }

    /// Drop the per-tick election memo; must run at every tick start
    pub fn reset_tick_cache(&mut self) {
        self.mutex_cache.clear();
    }

    // --- mutex maintenance ----------------------------------------------

    /// Force-release every held overlap mutex, returning their summaries
    pub async fn clear_mutexes(&self) -> SchedulerResult<Vec<String>> {
        let mut cleared = Vec::new();
        for event in &self.events {
            if self.event_mutex.exists(event).await? {
                self.event_mutex.forget(event).await?;
                cleared.push(event.summary_for_display());
            }
        }
        Ok(cleared)
    }
}

/// Render a parameter list into its command-line form
fn compile_parameters(parameters: &[ScheduleParam]) -> String {
    let platform = Platform::current();
    let mut rendered = Vec::with_capacity(parameters.len());

    for parameter in parameters {
        match parameter {
            ScheduleParam::Value(value) => rendered.push(escape_value(value, platform)),
            ScheduleParam::Pair(key, value) => {
                let value = escape_value(value, platform);
                // A value that already carries its key is passed through whole
                if value.contains(key.as_str()) {
                    rendered.push(value);
                } else {
                    rendered.push(format!("{}={}", key, value));
                }
            }
            ScheduleParam::Repeated(key, values) => {
                let compiled = values
                    .iter()
                    .map(|value| {
                        let value = escape_argument(value, platform);
                        if key.starts_with("--") {
                            format!("{}={}", key, value)
                        } else if key.starts_with('-') {
                            format!("{} {}", key, value)
                        } else {
                            value
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                rendered.push(compiled);
            }
        }
    }

    rendered.join(" ")
}

fn escape_value(value: &str, platform: Platform) -> String {
    if is_numeric(value) || looks_like_flag(value) {
        value.to_string()
    } else {
        escape_argument(value, platform)
    }
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.parse::<f64>().is_ok()
}

fn looks_like_flag(value: &str) -> bool {
    value.starts_with("--") || (value.len() == 2 && value.starts_with('-'))
}
