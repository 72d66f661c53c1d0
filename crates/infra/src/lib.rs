//! # Chronarc Infra
//!
//! Infrastructure adapters behind the core scheduling ports:
//! - In-memory TTL cache store and the cache-backed mutex providers
//! - Tokio-process-backed process handles for shell events
//! - In-memory queue for `Schedule::job` dispatches
//! - Tracing-based notification sink
//! - Configuration loading (environment + file probing)

pub mod cache;
pub mod config;
pub mod mutex;
pub mod observability;
pub mod process;
pub mod queue;

pub use cache::MemoryCacheStore;
pub use mutex::{CacheEventMutex, CacheSchedulingMutex};
pub use observability::TracingNotifier;
pub use process::{ShellProcess, ShellSpawner};
pub use queue::{DispatchedJob, MemoryQueue};
