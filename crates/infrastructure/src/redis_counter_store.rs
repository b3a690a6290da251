//! Redis-backed admission counter store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use storefront_application::{CounterStore, CounterTick};
use storefront_core::{AppError, AppResult};
use tokio::sync::OnceCell;

const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])

if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end

return {count, ttl}
"#;

const IMPOSE_PENALTY_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
  return tonumber(existing)
end

redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[1])
if redis.call('EXISTS', KEYS[2]) == 1 then
  redis.call('PEXPIRE', KEYS[2], ARGV[1])
end

return tonumber(ARGV[2])
"#;

/// Redis implementation of the admission counter store port.
///
/// Each `(policy, identity)` pair owns two keys sharing one hash tag, so
/// the penalty script stays valid on a cluster:
/// `{prefix}:{<key>}:count` and `{prefix}:{<key>}:block`.
#[derive(Clone)]
pub struct RedisCounterStore {
    client: redis::Client,
    connection: Arc<OnceCell<ConnectionManager>>,
    key_prefix: String,
    operation_timeout: Duration,
    increment_script: Script,
    impose_penalty_script: Script,
}

impl RedisCounterStore {
    /// Creates a store with a configured Redis client, key prefix and
    /// per-operation timeout.
    ///
    /// No connection is opened until the first operation.
    #[must_use]
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            connection: Arc::new(OnceCell::new()),
            key_prefix: key_prefix.into(),
            operation_timeout,
            increment_script: Script::new(INCREMENT_SCRIPT),
            impose_penalty_script: Script::new(IMPOSE_PENALTY_SCRIPT),
        }
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}:{{{key}}}:count", self.key_prefix)
    }

    fn block_key(&self, key: &str) -> String {
        format!("{}:{{{key}}}:block", self.key_prefix)
    }

    async fn with_timeout<T, F>(&self, operation: &str, future: F) -> AppResult<T>
    where
        F: std::future::Future<Output = AppResult<T>>,
    {
        tokio::time::timeout(self.operation_timeout, future)
            .await
            .map_err(|_| {
                AppError::StoreUnavailable(format!(
                    "redis {operation} timed out after {}ms",
                    self.operation_timeout.as_millis()
                ))
            })?
    }

    async fn connection(&self) -> AppResult<ConnectionManager> {
        self.connection
            .get_or_try_init(|| async {
                self.client
                    .get_connection_manager()
                    .await
                    .map_err(|error| {
                        AppError::StoreUnavailable(format!("failed to connect to redis: {error}"))
                    })
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get_block(&self, key: &str) -> AppResult<Option<DateTime<Utc>>> {
        let block_key = self.block_key(key);

        let blocked_until: Option<i64> = self
            .with_timeout("get_block", async {
                let mut connection = self.connection().await?;
                connection.get::<_, Option<i64>>(block_key).await.map_err(|error| {
                    AppError::StoreUnavailable(format!("failed to read redis penalty: {error}"))
                })
            })
            .await?;

        blocked_until.map(epoch_ms_to_datetime).transpose()
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

        let counter_key = self.counter_key(key);
        let window_ms = u64::from(window_seconds) * 1000;

        let (count, window_remaining_ms): (i64, i64) = self
            .with_timeout("increment", async {
                let mut connection = self.connection().await?;
                self.increment_script
                    .key(counter_key)
                    .arg(window_ms)
                    .invoke_async::<(i64, i64)>(&mut connection)
                    .await
                    .map_err(|error| {
                        AppError::StoreUnavailable(format!(
                            "failed to increment redis admission counter: {error}"
                        ))
                    })
            })
            .await?;

        let count = u64::try_from(count)
            .map_err(|error| AppError::Internal(format!("invalid redis counter value: {error}")))?;

        Ok(CounterTick {
            count,
            window_remaining_ms: u64::try_from(window_remaining_ms).unwrap_or(0),
        })
    }

    async fn set_block(&self, key: &str, penalty_seconds: u32) -> AppResult<DateTime<Utc>> {
        if penalty_seconds == 0 {
            return Err(AppError::Validation(
                "penalty_seconds must be greater than zero".to_owned(),
            ));
        }

        let block_key = self.block_key(key);
        let counter_key = self.counter_key(key);
        let penalty_ms = i64::from(penalty_seconds) * 1000;
        let blocked_until = Utc::now().timestamp_millis() + penalty_ms;

        let effective_until: i64 = self
            .with_timeout("set_block", async {
                let mut connection = self.connection().await?;
                self.impose_penalty_script
                    .key(block_key)
                    .key(counter_key)
                    .arg(penalty_ms)
                    .arg(blocked_until)
                    .invoke_async::<i64>(&mut connection)
                    .await
                    .map_err(|error| {
                        AppError::StoreUnavailable(format!(
                            "failed to impose redis admission penalty: {error}"
                        ))
                    })
            })
            .await?;

        epoch_ms_to_datetime(effective_until)
    }
}

fn epoch_ms_to_datetime(epoch_ms: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(epoch_ms).single().ok_or_else(|| {
        AppError::Internal(format!("invalid redis penalty timestamp: {epoch_ms}"))
    })
}
