//! Configuration loader
//!
//! Loads scheduler configuration from a file, then applies environment
//! overrides.
//!
//! ## Loading Strategy
//! 1. An explicit path is used as-is
//! 2. Otherwise multiple locations are probed for config files
//! 3. With no file at all, defaults apply (no jobs)
//! 4. `CHRONARC_*` environment variables override scalar settings last
//!
//! ## Environment Variables
//! - `CHRONARC_TIMEZONE`: default timezone for job expressions
//! - `CHRONARC_MAINTENANCE_MODE`: hold back unexempted jobs (true/false)
//! - `CHRONARC_POOL_SIZE`: concurrent slot count for `run --pool`
//! - `CHRONARC_PROCESS_TIMEOUT_SECS`: max runtime per pooled process
//!
//! ## File Locations
//! The loader probes (in order): `./chronarc.toml`, `./chronarc.json`,
//! `./config.toml`, `./config.json`, the same names one directory up, and
//! relative to the executable location. TOML and JSON are both accepted,
//! selected by extension.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chronarc_domain::{ChronarcError, Config, Result};

const CANDIDATE_NAMES: [&str; 4] = ["chronarc.toml", "chronarc.json", "config.toml", "config.json"];

/// Load configuration with the full fallback strategy
///
/// # Errors
/// Returns `ChronarcError::Config` if an explicit file is unreadable, a
/// found file fails to parse, or an environment override is malformed.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => match probe_config_paths() {
            Some(found) => {
                tracing::info!(path = %found.display(), "Configuration loaded from file");
                load_from_file(&found)?
            }
            None => {
                tracing::debug!("No config file found, starting from defaults");
                Config::default()
            }
        },
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Load configuration from a specific file
///
/// The format is selected by extension: `.json` parses as JSON, anything
/// else as TOML.
pub fn load_from_file(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ChronarcError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&raw)
            .map_err(|e| ChronarcError::Config(format!("invalid JSON in {}: {}", path.display(), e))),
        _ => toml::from_str(&raw)
            .map_err(|e| ChronarcError::Config(format!("invalid TOML in {}: {}", path.display(), e))),
    }
}

fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = vec![PathBuf::from("."), PathBuf::from("..")];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            roots.push(dir.to_path_buf());
        }
    }
    for root in roots {
        for candidate in CANDIDATE_NAMES {
            let path = root.join(candidate);
            if path.is_file() {
                return Some(path);
            }
        }
    }
    None
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(tz) = std::env::var("CHRONARC_TIMEZONE") {
        config.timezone = Some(tz);
    }
    if let Some(value) = env_parse::<bool>("CHRONARC_MAINTENANCE_MODE")? {
        config.maintenance_mode = value;
    }
    if let Some(value) = env_parse::<usize>("CHRONARC_POOL_SIZE")? {
        config.runner.pool_size = value;
    }
    if let Some(value) = env_parse::<u64>("CHRONARC_PROCESS_TIMEOUT_SECS")? {
        config.runner.process_timeout_secs = Some(value);
    }
    Ok(())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ChronarcError::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_toml_config_from_explicit_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
                timezone = "UTC"

                [[jobs]]
                command = "echo nightly"
                cron = "0 2 * * *"
            "#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.timezone.as_deref(), Some("UTC"));
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].cron, "0 2 * * *");
    }

    #[test]
    fn loads_json_config_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "jobs": [ {{ "command": "echo hi" }} ] }}"#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].cron, "* * * * *");
    }

    #[test]
    fn rejects_malformed_files() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "not = [valid").unwrap();
        assert!(load_from_file(file.path()).is_err());
    }

    #[test]
    fn env_overrides_scalar_settings() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "maintenance_mode = false").unwrap();

        std::env::set_var("CHRONARC_POOL_SIZE", "12");
        let config = load(Some(file.path())).unwrap();
        std::env::remove_var("CHRONARC_POOL_SIZE");

        assert_eq!(config.runner.pool_size, 12);
    }
}
