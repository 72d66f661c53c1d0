//! Observability adapters

pub mod notifier;

pub use notifier::TracingNotifier;
