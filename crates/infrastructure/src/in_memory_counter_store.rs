use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use storefront_application::{Clock, CounterStore, CounterTick, SystemClock};
use storefront_core::{AppError, AppResult};
use tokio::sync::Mutex;

const SWEEP_THRESHOLD: usize = 10_000;
const SWEEP_INTERVAL_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct CounterState {
    counters: HashMap<String, CounterEntry>,
    blocks: HashMap<String, DateTime<Utc>>,
    last_swept_at: Option<DateTime<Utc>>,
}

impl CounterState {
    /// Drops expired counters and penalties once the map is large, at most
    /// once per sweep interval.
    fn sweep_expired(&mut self, now: DateTime<Utc>, threshold: usize) {
        if self.counters.len() < threshold {
            return;
        }

        let interval_elapsed = self
            .last_swept_at
            .is_none_or(|swept_at| now - swept_at >= Duration::milliseconds(SWEEP_INTERVAL_MS));
        if !interval_elapsed {
            return;
        }

        self.counters.retain(|_, entry| entry.expires_at > now);
        self.blocks.retain(|_, blocked_until| *blocked_until > now);
        self.last_swept_at = Some(now);
    }
}

/// In-process counter store for single-instance deployments and tests.
///
/// Counters are not shared between processes, so quotas only hold per
/// instance.
pub struct InMemoryCounterStore {
    clock: Arc<dyn Clock>,
    state: Mutex<CounterState>,
    sweep_threshold: usize,
}

impl InMemoryCounterStore {
    /// Creates an empty store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store driven by the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(CounterState::default()),
            sweep_threshold: SWEEP_THRESHOLD,
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get_block(&self, key: &str) -> AppResult<Option<DateTime<Utc>>> {
        let now = self.clock.now();
        let state = self.state.lock().await;

        Ok(state
            .blocks
            .get(key)
            .copied()
            .filter(|blocked_until| *blocked_until > now))
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window_seconds: u32,
    ) -> AppResult<CounterTick> {
        if window_seconds == 0 {
            return Err(AppError::Validation(
                "window_seconds must be greater than zero".to_owned(),
            ));
        }

        let now = self.clock.now();
        let mut state = self.state.lock().await;

        state.sweep_expired(now, self.sweep_threshold);

        let entry = state
            .counters
            .entry(key.to_owned())
            .and_modify(|entry| {
                if entry.expires_at <= now {
                    *entry = CounterEntry {
                        count: 0,
                        expires_at: now + Duration::seconds(i64::from(window_seconds)),
                    };
                }
            })
            .or_insert(CounterEntry {
                count: 0,
                expires_at: now + Duration::seconds(i64::from(window_seconds)),
            });
        entry.count += 1;

        Ok(CounterTick {
            count: entry.count,
            window_remaining_ms: u64::try_from((entry.expires_at - now).num_milliseconds())
                .unwrap_or(0),
        })
    }

    async fn set_block(&self, key: &str, penalty_seconds: u32) -> AppResult<DateTime<Utc>> {
        if penalty_seconds == 0 {
            return Err(AppError::Validation(
                "penalty_seconds must be greater than zero".to_owned(),
            ));
        }

        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if let Some(existing) = state
            .blocks
            .get(key)
            .copied()
            .filter(|blocked_until| *blocked_until > now)
        {
            return Ok(existing);
        }

        let blocked_until = now + Duration::seconds(i64::from(penalty_seconds));
        state.blocks.insert(key.to_owned(), blocked_until);
        if let Some(entry) = state.counters.get_mut(key) {
            entry.expires_at = blocked_until;
        }

        Ok(blocked_until)
    }
}
