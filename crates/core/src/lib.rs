//! # Chronarc Core
//!
//! Pure scheduling logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - The schedulable [`scheduling::Event`] and its run/finish state machine
//! - The fluent frequency builder (cron-expression construction)
//! - The [`scheduling::Schedule`] registry and due-event evaluation
//! - The [`scheduling::ScheduleRunner`] execution driver (tick and pool)
//! - Port/adapter interfaces (traits) for cache, queue, process, and
//!   notification collaborators
//!
//! ## Architecture Principles
//! - Only depends on `chronarc-common` and `chronarc-domain`
//! - No process spawning, cache backend, or platform code
//! - All external dependencies via traits
//! - Pure, testable scheduling logic

pub mod scheduling;

// Re-export specific items to avoid ambiguity
pub use scheduling::command_builder::{build_command, escape_argument, CommandSpec, Platform};
pub use scheduling::error::{SchedulerError, SchedulerResult};
pub use scheduling::event::{Event, EventPayload, HookContext, RunContext, RunOutcome};
pub use scheduling::notifications::{NotificationSink, NullNotifier};
pub use scheduling::ports::{
    CacheStore, EventMutex, ProcessHandle, ProcessSpawner, ProcessStatus, Queue, ScheduledJob,
    SchedulingMutex,
};
pub use scheduling::runner::{RunnerConfig, ScheduleRunner, TickSummary};
pub use scheduling::schedule::{Schedule, ScheduleParam};
