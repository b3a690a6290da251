//! Ports consumed by the admission engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_core::AppResult;

/// Shared key/value store holding admission counters and penalties.
///
/// Every operation is a fresh round trip; adapters must not cache counter
/// state locally. Connection failures and timeouts are reported as
/// `AppError::StoreUnavailable`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Returns when the active penalty for `key` ends, if one is recorded.
    async fn get_block(&self, key: &str) -> AppResult<Option<DateTime<Utc>>>;

    /// Atomically increments the window counter for `key`.
    ///
    /// The window expiry is set only when the increment creates the counter.
    async fn increment_with_expiry(&self, key: &str, window_seconds: u32)
    -> AppResult<CounterTick>;

    /// Imposes a penalty on `key` unless one is already active.
    ///
    /// Returns the effective penalty end, which is the existing one when
    /// another caller imposed it first. Imposing a penalty also pins the
    /// window counter to expire together with it, so a fresh window starts
    /// once the penalty is over.
    async fn set_block(&self, key: &str, penalty_seconds: u32) -> AppResult<DateTime<Utc>>;
}

/// Result of one atomic counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterTick {
    /// Operations observed in the current window, including this one.
    pub count: u64,
    /// Milliseconds until the window counter resets.
    pub window_remaining_ms: u64,
}

/// Wall clock port, replaceable in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
