//! Configuration structures for the scheduler
//!
//! The CLI builds its `Schedule` from these types; library embedders
//! construct events programmatically and may never touch them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CRON_EXPRESSION, DEFAULT_POOL_SIZE};

/// Top-level scheduler configuration (`chronarc.toml` + `CHRONARC_*` env)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default timezone applied to jobs that do not set their own
    #[serde(default)]
    pub timezone: Option<String>,
    /// When true, jobs without `even_in_maintenance_mode` are held back
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// Runner tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Concurrent slot count for `run --pool`
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Per-process max runtime enforced by the pool poll cycle
    #[serde(default)]
    pub process_timeout_secs: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self { pool_size: default_pool_size(), process_timeout_secs: None }
    }
}

/// One scheduled shell job as declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Shell command line to execute
    pub command: String,
    /// Human-readable name; doubles as the overlap-mutex identity
    #[serde(default)]
    pub name: Option<String>,
    /// Five-field cron expression (minute hour day month weekday)
    #[serde(default = "default_expression")]
    pub cron: String,
    /// IANA timezone the expression is evaluated in
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub without_overlapping: bool,
    /// Overlap-mutex lifetime override, in minutes
    #[serde(default)]
    pub mutex_expiry_minutes: Option<u64>,
    #[serde(default)]
    pub on_one_server: bool,
    #[serde(default)]
    pub run_in_background: bool,
    #[serde(default)]
    pub even_in_maintenance_mode: bool,
    /// Run the command as this user (POSIX only)
    #[serde(default)]
    pub user: Option<String>,
    /// Redirect combined stdout/stderr here instead of the null device
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub append_output: bool,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_expression() -> String {
    DEFAULT_CRON_EXPRESSION.to_string()
}
