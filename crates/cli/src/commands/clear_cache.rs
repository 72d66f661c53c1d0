//! `chronarc clear-cache` - force-release held overlap mutexes

use chronarc_domain::Result;

use crate::context::AppContext;

/// Delete every held overlap mutex for the configured events
pub async fn handle(app: &AppContext) -> Result<()> {
    let cleared = app.schedule.clear_mutexes().await?;

    if cleared.is_empty() {
        println!("No mutex entries were found.");
    } else {
        for summary in cleared {
            println!("Deleted mutex for [{}]", summary);
        }
    }
    Ok(())
}
