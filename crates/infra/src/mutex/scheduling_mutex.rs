//! Single-server election mutex over a cache store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronarc_core::{CacheStore, Event, SchedulerResult, SchedulingMutex};
use chronarc_domain::constants::SCHEDULING_MUTEX_TTL_SECS;

/// Cache-backed scheduling strategy
///
/// Keys embed the `HHmm` minute bucket, so at most one server runs a
/// given event within a given minute: leader-election-by-cache, not
/// consensus. A cache outage or clock skew can cause a double-run or a
/// no-run; that degraded mode is accepted.
pub struct CacheSchedulingMutex {
    store: Arc<dyn CacheStore>,
}

impl CacheSchedulingMutex {
    /// Create a new scheduling strategy over the given store
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    fn key(event: &Event, time: DateTime<Utc>) -> String {
        format!("{}{}", event.mutex_name(), time.format("%H%M"))
    }
}

#[async_trait]
impl SchedulingMutex for CacheSchedulingMutex {
    async fn create(&self, event: &Event, time: DateTime<Utc>) -> SchedulerResult<bool> {
        self.store.add(&Self::key(event, time), Duration::from_secs(SCHEDULING_MUTEX_TTL_SECS)).await
    }

    async fn exists(&self, event: &Event, time: DateTime<Utc>) -> SchedulerResult<bool> {
        self.store.has(&Self::key(event, time)).await
    }
}
