//! Wall-clock abstraction for testability
//!
//! Provides a trait-based approach to reading the current wall-clock time
//! so due-evaluation and TTL logic can be tested deterministically without
//! relying on actual time passage.
//!
//! # Examples
//!
//! ```
//! use chrono::Duration;
//! use chronarc_common::time::{Clock, MockClock, SystemClock};
//!
//! // Use the system clock in production
//! let clock = SystemClock;
//! let now = clock.now_utc();
//!
//! // Use the mock clock in tests
//! let mock = MockClock::default();
//! let start = mock.now_utc();
//! mock.advance(Duration::seconds(5));
//! assert_eq!(mock.now_utc() - start, Duration::seconds(5));
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Trait for wall-clock reads
///
/// Scheduling code never calls `Utc::now()` directly; it asks a `Clock`,
/// allowing tests to pin "now" to an exact minute.
pub trait Clock: Send + Sync {
    /// Get the current wall-clock time in UTC
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock implementation
///
/// Use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing
///
/// Starts at the real current time (or any pinned instant) and only moves
/// when told to. Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock pinned to the given instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(now)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now += duration;
    }

    /// Pin the mock clock to a specific instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
