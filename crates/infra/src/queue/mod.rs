//! Queue adapters

pub mod memory;

pub use memory::{DispatchedJob, MemoryQueue};
