//! Application context
//!
//! Builds the schedule and runner from configuration. The schedule is an
//! explicit instance threaded into each command handler; nothing lives in
//! process-wide state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use chronarc_common::time::{Clock, SystemClock};
use chronarc_core::{
    CacheStore, RunContext, Schedule, ScheduleRunner, SchedulerError,
};
use chronarc_domain::{ChronarcError, Config, JobDefinition, Result};
use chronarc_infra::{
    CacheEventMutex, CacheSchedulingMutex, MemoryCacheStore, ShellSpawner, TracingNotifier,
};

/// Everything a command handler needs for one invocation
pub struct AppContext {
    pub config: Config,
    pub schedule: Schedule,
    pub runner: ScheduleRunner,
    pub clock: Arc<dyn Clock>,
}

/// Load configuration and assemble the scheduling stack
pub fn build(config_path: Option<&Path>) -> Result<AppContext> {
    let config = chronarc_infra::config::load(config_path)?;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let event_mutex = Arc::new(CacheEventMutex::new(Arc::clone(&store)));
    let scheduling_mutex = Arc::new(CacheSchedulingMutex::new(store));

    let mut schedule = Schedule::new(event_mutex, scheduling_mutex);
    if let Some(tz) = &config.timezone {
        schedule = schedule.with_timezone(parse_timezone(tz)?);
    }
    for job in &config.jobs {
        register_job(&mut schedule, job)?;
    }

    let ctx = RunContext {
        spawner: Arc::new(ShellSpawner),
        base_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        process_timeout: config.runner.process_timeout_secs.map(Duration::from_secs),
        maintenance_mode: config.maintenance_mode,
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runner = ScheduleRunner::new(Arc::clone(&clock), Arc::new(TracingNotifier), ctx);

    Ok(AppContext { config, schedule, runner, clock })
}

fn register_job(schedule: &mut Schedule, job: &JobDefinition) -> Result<()> {
    let event = schedule.exec(&job.command, &[]);
    event.cron(&job.cron)?;

    if let Some(tz) = &job.timezone {
        let tz = parse_timezone(tz)?;
        event.timezone(tz);
    }
    if let Some(name) = &job.name {
        event.name(name);
    }
    if job.without_overlapping {
        match job.mutex_expiry_minutes {
            Some(minutes) => event.without_overlapping_for(minutes)?,
            None => event.without_overlapping()?,
        };
    }
    if job.on_one_server {
        event.on_one_server();
    }
    if job.run_in_background {
        event.run_in_background();
    }
    if job.even_in_maintenance_mode {
        event.even_in_maintenance_mode();
    }
    if let Some(user) = &job.user {
        event.user(user);
    }
    if let Some(output) = &job.output {
        if job.append_output {
            event.append_output_to(output);
        } else {
            event.send_output_to(output);
        }
    }
    Ok(())
}

fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse::<Tz>()
        .map_err(|_| ChronarcError::from(SchedulerError::InvalidTimezone(tz.to_string())))
}
