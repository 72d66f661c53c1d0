//! Platform-specific command-line rendering
//!
//! Renders an event's command into the string handed to the shell:
//! output redirection (truncate or append, stderr merged), background
//! launch syntax, and privilege dropping. Pure string manipulation, fully
//! parameterized over the target platform so both branches are testable on
//! any host.

use std::path::Path;

/// Target platform for command rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// POSIX shells (`sh`)
    Unix,
    /// `cmd.exe`
    Windows,
}

impl Platform {
    /// The platform this process is running on
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Inputs to command rendering, extracted from an event
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    /// The compiled command line
    pub command: &'a str,
    /// Redirection target for combined stdout/stderr
    pub output: &'a Path,
    /// Append (`>>`) instead of truncate (`>`)
    pub append: bool,
    /// Launch in the background
    pub background: bool,
    /// Run as this user (POSIX only)
    pub user: Option<&'a str>,
}

/// Build the full shell command line for the given spec
pub fn build_command(spec: &CommandSpec<'_>, platform: Platform) -> String {
    if spec.background {
        build_background_command(spec, platform)
    } else {
        build_foreground_command(spec, platform)
    }
}

fn build_foreground_command(spec: &CommandSpec<'_>, platform: Platform) -> String {
    let output = escape_argument(&spec.output.to_string_lossy(), platform);
    let redirect = redirect_operator(spec.append);
    ensure_correct_user(spec, format!("{}{}{} 2>&1", spec.command, redirect, output), platform)
}

fn build_background_command(spec: &CommandSpec<'_>, platform: Platform) -> String {
    let output = escape_argument(&spec.output.to_string_lossy(), platform);
    let redirect = redirect_operator(spec.append);

    match platform {
        Platform::Windows => format!(
            "start /b cmd /v:on /c \"({} & ^!ERRORLEVEL^!){}{} 2>&1\"",
            spec.command, redirect, output
        ),
        Platform::Unix => ensure_correct_user(
            spec,
            format!("{}{}{} 2>&1 &", spec.command, redirect, output),
            platform,
        ),
    }
}

fn redirect_operator(append: bool) -> &'static str {
    if append {
        " >> "
    } else {
        " > "
    }
}

fn ensure_correct_user(spec: &CommandSpec<'_>, command: String, platform: Platform) -> String {
    match (spec.user, platform) {
        (Some(user), Platform::Unix) => format!("sudo -u {} -- sh -c '{}'", user, command),
        _ => command,
    }
}

/// Escape a single shell argument for the given platform
///
/// Arguments made purely of safe characters pass through untouched so
/// rendered command lines stay readable; anything else is quoted.
pub fn escape_argument(argument: &str, platform: Platform) -> String {
    if !argument.is_empty() && argument.chars().all(is_shell_safe) {
        return argument.to_string();
    }
    match platform {
        Platform::Unix => format!("'{}'", argument.replace('\'', "'\\''")),
        Platform::Windows => format!("\"{}\"", argument.replace('"', "\"\"")),
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '@' | '+')
}
