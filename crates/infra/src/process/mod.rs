//! Process adapters
//!
//! Shell events run through an opaque process-handle capability. The
//! tokio-backed implementation here drives `sh -c` (or `cmd /C`) with
//! piped output so callers can stream incremental stdout/stderr.

pub mod shell;

pub use shell::{ShellProcess, ShellSpawner};
