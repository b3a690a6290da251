use std::sync::Arc;

use storefront_application::{
    AdmissionEngine, AdmissionService, CounterStore, PolicyRegistry, SystemClock,
};
use storefront_core::AppError;
use storefront_infrastructure::{InMemoryCounterStore, RedisCounterStore};
use tracing::warn;

use crate::api_config::{ApiConfig, CounterStoreConfig};
use crate::client_origin::TrustedProxies;
use crate::state::AppState;

use super::build_redis_client;

pub fn build_app_state(config: &ApiConfig) -> Result<AppState, AppError> {
    match &config.counter_store {
        CounterStoreConfig::Redis { redis_url } => {
            let redis_client = build_redis_client(redis_url)?;
            let store = Arc::new(RedisCounterStore::new(
                redis_client.clone(),
                config.key_prefix.clone(),
                config.store_timeout,
            ));
            build_app_state_with_store(config, store, Some(redis_client))
        }
        CounterStoreConfig::Memory => {
            warn!("using in-memory admission counters; quotas are not shared between instances");
            build_app_state_with_store(config, Arc::new(InMemoryCounterStore::new()), None)
        }
    }
}

pub fn build_app_state_with_store(
    config: &ApiConfig,
    store: Arc<dyn CounterStore>,
    redis_client: Option<redis::Client>,
) -> Result<AppState, AppError> {
    let registry = Arc::new(PolicyRegistry::new(config.policies.iter().cloned())?);
    let engine = AdmissionEngine::new(store, Arc::new(SystemClock));

    Ok(AppState {
        admission_service: AdmissionService::new(registry, engine),
        trusted_proxies: Arc::new(TrustedProxies::new(config.trusted_proxies.clone())),
        redis_client,
    })
}
