//! `chronarc list` - render the schedule

use chrono_tz::Tz;
use chronarc_common::time::Clock;
use chronarc_core::SchedulerError;
use chronarc_domain::{ChronarcError, Result};

use crate::context::AppContext;

/// Print expression, repeat cadence, summary, and next due time per event
pub fn handle(app: &AppContext, timezone: Option<&str>) -> Result<()> {
    if app.schedule.events().is_empty() {
        println!("No scheduled tasks have been defined.");
        return Ok(());
    }

    let display_tz = match timezone {
        Some(tz) => Some(tz.parse::<Tz>().map_err(|_| {
            ChronarcError::from(SchedulerError::InvalidTimezone(tz.to_string()))
        })?),
        None => None,
    };
    let now = app.clock.now_utc();

    for event in app.schedule.events() {
        let repeat = event
            .repeat_seconds()
            .map(|seconds| format!(" {}s", seconds))
            .unwrap_or_default();
        let next_due = match (event.next_run_date(now), display_tz) {
            (Some(next), Some(tz)) => next.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
            (Some(next), None) => next.format("%Y-%m-%d %H:%M UTC").to_string(),
            (None, _) => "never".to_string(),
        };
        println!(
            "{}{}  {}  Next Due: {}",
            event.expression(),
            repeat,
            event.summary_for_display(),
            next_due
        );
    }
    Ok(())
}
