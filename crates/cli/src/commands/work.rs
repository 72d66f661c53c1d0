//! `chronarc work` - long-running schedule worker
//!
//! Polls the wall clock and, at every new minute boundary, launches
//! `chronarc run` as a child process, streaming its incremental output
//! while previous executions drain. Ctrl-C stops the loop; running
//! executions are left to finish on their own.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use chronarc_core::{escape_argument, Platform, ProcessHandle, ProcessSpawner};
use chronarc_domain::constants::WORK_POLL_INTERVAL_MS;
use chronarc_domain::{ChronarcError, Result};
use chronarc_infra::ShellSpawner;

/// Run `chronarc run` once per minute until interrupted
pub async fn handle(run_output_file: Option<&Path>) -> Result<()> {
    println!("Schedule worker started successfully.");

    let command = run_command_line(run_output_file)?;
    let working_dir = std::env::current_dir()
        .map_err(|e| ChronarcError::Internal(format!("cannot resolve working directory: {}", e)))?;

    let spawner = ShellSpawner;
    let mut executions: Vec<Box<dyn ProcessHandle>> = Vec::new();
    let mut last_started: Option<DateTime<Utc>> = None;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(WORK_POLL_INTERVAL_MS)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Schedule worker stopping.");
                break;
            }
        }

        let now = Utc::now();
        let minute = start_of_minute(now);
        if now.second() == 0 && last_started != Some(minute) {
            let mut execution = spawner
                .spawn(&command, &working_dir, None)
                .map_err(ChronarcError::from)?;
            execution.start().await.map_err(ChronarcError::from)?;
            executions.push(execution);
            last_started = Some(minute);
        }

        let mut index = 0;
        while index < executions.len() {
            let execution = &mut executions[index];
            let output = execution.read_incremental_output();
            if !output.is_empty() {
                print!("{}", output);
            }
            let errors = execution.read_incremental_error_output();
            if !errors.is_empty() {
                eprint!("{}", errors);
            }
            match execution.is_running() {
                Ok(true) => index += 1,
                Ok(false) => {
                    executions.remove(index);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Lost track of a schedule:run execution");
                    executions.remove(index);
                }
            }
        }
    }

    Ok(())
}

fn run_command_line(run_output_file: Option<&Path>) -> Result<String> {
    let binary = std::env::current_exe()
        .map_err(|e| ChronarcError::Internal(format!("cannot resolve executable: {}", e)))?;
    let mut command =
        format!("{} run", escape_argument(&binary.to_string_lossy(), Platform::current()));
    if let Some(file) = run_output_file {
        command.push_str(&format!(
            " >> {} 2>&1",
            escape_argument(&file.to_string_lossy(), Platform::current())
        ));
    }
    Ok(command)
}

fn start_of_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::seconds(i64::from(now.second()))
        - chrono::Duration::nanoseconds(i64::from(now.nanosecond()))
}
