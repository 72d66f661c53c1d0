//! Overlap-prevention mutex over a cache store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chronarc_core::{CacheStore, Event, EventMutex, SchedulerResult};

/// Cache-backed overlap strategy
///
/// Guarantees at most one concurrent execution of a given named event
/// across every process sharing the cache store, provided the store's
/// create-if-absent is atomic.
pub struct CacheEventMutex {
    store: Arc<dyn CacheStore>,
}

impl CacheEventMutex {
    /// Create a new overlapping strategy over the given store
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventMutex for CacheEventMutex {
    async fn create(&self, event: &Event) -> SchedulerResult<bool> {
        let ttl = Duration::from_secs(event.mutex_expiry_minutes() * 60);
        self.store.add(&event.mutex_name(), ttl).await
    }

    async fn exists(&self, event: &Event) -> SchedulerResult<bool> {
        self.store.has(&event.mutex_name()).await
    }

    async fn forget(&self, event: &Event) -> SchedulerResult<()> {
        self.store.forget(&event.mutex_name()).await
    }
}
