//! `chronarc run` - evaluate and execute due events

use chronarc_common::time::Clock;
use chronarc_domain::Result;

use crate::context::AppContext;

/// Run one scheduler tick, optionally under the bounded pool
pub async fn handle(app: &mut AppContext, pool: bool, size: Option<usize>) -> Result<()> {
    let summary = if pool {
        let size = size.unwrap_or(app.config.runner.pool_size);
        println!(
            "[{}] Running scheduled commands in a pool of {}",
            app.clock.now_utc().format("%Y-%m-%dT%H:%M:%S%z"),
            size
        );
        app.runner.run_pool(&mut app.schedule, size).await?
    } else {
        app.runner.run_tick(&mut app.schedule).await?
    };

    if summary.is_empty() {
        println!("No scheduled commands are ready to run.");
    } else {
        println!(
            "{} ran, {} skipped, {} failed.",
            summary.ran, summary.skipped, summary.failed
        );
    }
    Ok(())
}
