use serde::{Deserialize, Serialize};

/// Outcome of one admission check. Computed per call and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Operations left in the current window; zero when denied.
    pub remaining_quota: u32,
    /// Milliseconds until the caller may usefully retry.
    pub reset_after_ms: u64,
    /// Set when the counter store was not consulted.
    pub degraded: bool,
}

impl AdmissionDecision {
    /// Builds an allow decision backed by the counter store.
    #[must_use]
    pub fn allowed(remaining_quota: u32, reset_after_ms: u64) -> Self {
        Self {
            allowed: true,
            remaining_quota,
            reset_after_ms,
            degraded: false,
        }
    }

    /// Builds a deny decision.
    #[must_use]
    pub fn denied(reset_after_ms: u64) -> Self {
        Self {
            allowed: false,
            remaining_quota: 0,
            reset_after_ms,
            degraded: false,
        }
    }

    /// Builds the fail-open decision used while the counter store is down.
    ///
    /// The full quota is reported because no usage could be observed.
    #[must_use]
    pub fn degraded(quota: u32) -> Self {
        Self {
            allowed: true,
            remaining_quota: quota,
            reset_after_ms: 0,
            degraded: true,
        }
    }

    /// Returns the retry hint in whole seconds, rounded up.
    #[must_use]
    pub fn retry_after_seconds(&self) -> u64 {
        self.reset_after_ms.div_ceil(1000)
    }

    /// Returns the epoch millisecond at which the quota resets.
    #[must_use]
    pub fn reset_at_epoch_ms(&self, now_epoch_ms: i64) -> i64 {
        let reset_after_ms = i64::try_from(self.reset_after_ms).unwrap_or(i64::MAX);
        now_epoch_ms.saturating_add(reset_after_ms)
    }
}
