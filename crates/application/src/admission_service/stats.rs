use std::sync::atomic::{AtomicU64, Ordering};

use storefront_domain::AdmissionDecision;

/// Process-local counters of admission outcomes.
#[derive(Debug, Default)]
pub struct AdmissionStats {
    allowed: AtomicU64,
    denied: AtomicU64,
    degraded: AtomicU64,
}

/// Point-in-time copy of [`AdmissionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionStatsSnapshot {
    /// Decisions allowed after consulting the store.
    pub allowed: u64,
    /// Decisions denied.
    pub denied: u64,
    /// Decisions allowed without the store (fail-open).
    pub degraded: u64,
}

impl AdmissionStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one decision. Degraded decisions are not counted as allowed.
    pub fn record(&self, decision: &AdmissionDecision) {
        let counter = if decision.degraded {
            &self.degraded
        } else if decision.allowed {
            &self.allowed
        } else {
            &self.denied
        };

        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> AdmissionStatsSnapshot {
        AdmissionStatsSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}
