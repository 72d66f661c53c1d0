//! Scheduling engine
//!
//! Applications register events on a [`Schedule`] at boot; a periodic
//! trigger (typically once per minute) invokes the [`ScheduleRunner`],
//! which asks the schedule for due events, applies filters and
//! single-server election, and executes each event through its run/finish
//! lifecycle, consulting the mutex providers before and after.

pub mod command_builder;
pub mod error;
pub mod event;
pub mod frequency;
pub mod notifications;
pub mod ports;
pub mod runner;
pub mod schedule;

pub use error::{SchedulerError, SchedulerResult};
pub use event::{Event, RunContext, RunOutcome};
pub use notifications::NotificationSink;
pub use runner::ScheduleRunner;
pub use schedule::Schedule;
