//! In-memory TTL cache store
//!
//! A clock-injected map of key to expiry instant. Expired entries are
//! treated as absent and reaped lazily on access. `add` holds the map lock
//! for the whole check-and-insert, which gives it the atomic
//! create-if-absent semantics the mutex providers rely on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronarc_common::time::{Clock, SystemClock};
use chronarc_core::{CacheStore, SchedulerError, SchedulerResult};
use parking_lot::Mutex;

/// Thread-safe in-memory cache with per-entry TTL
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    /// Create a store using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store with a custom clock (useful for testing TTL expiry)
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), clock }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = self.clock.now_utc();
        self.entries.lock().values().filter(|expiry| **expiry > now).count()
    }

    /// True when no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn add(&self, key: &str, ttl: Duration) -> SchedulerResult<bool> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| SchedulerError::Cache(format!("ttl out of range: {}", e)))?;
        let now = self.clock.now_utc();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn has(&self, key: &str) -> SchedulerResult<bool> {
        let now = self.clock.now_utc();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(expiry) if *expiry > now => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn forget(&self, key: &str) -> SchedulerResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
