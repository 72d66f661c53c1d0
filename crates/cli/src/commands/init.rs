//! `chronarc init` - write a sample configuration file

use std::path::Path;

use chronarc_domain::{ChronarcError, Result};

const SAMPLE_CONFIG: &str = r#"# Chronarc schedule definition.
#
# Each [[jobs]] entry runs `command` through the shell whenever `cron`
# matches. See `chronarc list` for the resulting schedule.

timezone = "UTC"

[runner]
pool_size = 4

[[jobs]]
name = "heartbeat"
command = "echo heartbeat"
cron = "* * * * *"

[[jobs]]
name = "nightly-cleanup"
command = "find /tmp/chronarc -mtime +7 -delete"
cron = "0 2 * * *"
without_overlapping = true
output = "/var/log/chronarc/cleanup.log"
append_output = true
"#;

/// Write `chronarc.toml` into the current directory
pub fn handle() -> Result<()> {
    let target = Path::new("chronarc.toml");
    if target.exists() {
        println!("chronarc.toml already exists; leaving it untouched.");
        return Ok(());
    }

    std::fs::write(target, SAMPLE_CONFIG)
        .map_err(|e| ChronarcError::Config(format!("cannot write chronarc.toml: {}", e)))?;
    println!("Wrote chronarc.toml.");
    Ok(())
}
