use std::sync::Arc;

use chrono::{DateTime, Utc};

use storefront_core::AppResult;
use storefront_domain::{AdmissionDecision, IdentityKey, Policy};

use crate::admission_ports::{Clock, CounterStore};

/// Stateless decision engine over an injected counter store.
#[derive(Clone)]
pub struct AdmissionEngine {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl AdmissionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Decides whether one more operation for `key` fits under `policy`.
    ///
    /// An active penalty denies without touching the counter, so retries
    /// during the penalty never extend it. The increment that produces
    /// `quota + 1` is the one that imposes the penalty; concurrent callers
    /// past that line reuse whatever penalty the store already holds.
    pub async fn decide(&self, policy: &Policy, key: &IdentityKey) -> AppResult<AdmissionDecision> {
        let store_key = store_key(policy, key);

        if let Some(blocked_until) = self.store.get_block(&store_key).await? {
            let now = self.clock.now();
            if blocked_until > now {
                return Ok(AdmissionDecision::denied(millis_until(now, blocked_until)));
            }
        }

        let tick = self
            .store
            .increment_with_expiry(&store_key, policy.window_seconds())
            .await?;
        let quota = u64::from(policy.quota());

        if tick.count <= quota {
            let remaining = u32::try_from(quota - tick.count).unwrap_or(u32::MAX);
            return Ok(AdmissionDecision::allowed(remaining, tick.window_remaining_ms));
        }

        let blocked_until = self
            .store
            .set_block(&store_key, policy.penalty_seconds())
            .await?;

        if tick.count == quota + 1 {
            return Ok(AdmissionDecision::denied(policy.penalty_ms()));
        }

        // A penalty that already lapsed on this clock still denies this call,
        // so the retry hint never reads zero.
        Ok(AdmissionDecision::denied(
            millis_until(self.clock.now(), blocked_until).max(1),
        ))
    }
}

fn store_key(policy: &Policy, key: &IdentityKey) -> String {
    format!("{}:{}", policy.name(), key.as_str())
}

fn millis_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    u64::try_from((until - now).num_milliseconds()).unwrap_or(0)
}
