use std::sync::Arc;

use tracing::{debug, error, warn};

use storefront_core::{AppError, AppResult};
use storefront_domain::{AdmissionDecision, IdentityKey};

use crate::policy_registry::PolicyRegistry;

use super::engine::AdmissionEngine;
use super::stats::AdmissionStats;

/// Application service answering admission checks for protected operations.
#[derive(Clone)]
pub struct AdmissionService {
    registry: Arc<PolicyRegistry>,
    engine: AdmissionEngine,
    stats: Arc<AdmissionStats>,
}

impl AdmissionService {
    /// Creates a new admission service.
    #[must_use]
    pub fn new(registry: Arc<PolicyRegistry>, engine: AdmissionEngine) -> Self {
        Self {
            registry,
            engine,
            stats: Arc::new(AdmissionStats::new()),
        }
    }

    /// Returns the policy registry backing this service.
    #[must_use]
    pub fn registry(&self) -> &PolicyRegistry {
        self.registry.as_ref()
    }

    /// Returns the outcome counters.
    #[must_use]
    pub fn stats(&self) -> &AdmissionStats {
        self.stats.as_ref()
    }

    /// Checks one operation for `key` against the policy named `policy_name`.
    ///
    /// Only an unknown policy is returned as an error. Any store failure
    /// fails open with a degraded decision. The store round trip runs on its
    /// own task so a cancelled caller never leaves a half-applied decision
    /// behind.
    pub async fn check(&self, policy_name: &str, key: &IdentityKey) -> AppResult<AdmissionDecision> {
        let policy = self.registry.get(policy_name)?.clone();

        let engine = self.engine.clone();
        let task_policy = policy.clone();
        let task_key = key.clone();
        let outcome = tokio::spawn(async move { engine.decide(&task_policy, &task_key).await })
            .await
            .map_err(|join_error| {
                AppError::Internal(format!("admission decision task failed: {join_error}"))
            })
            .and_then(|result| result);

        let decision = match outcome {
            Ok(decision) => decision,
            Err(store_error) if store_error.is_store_unavailable() => {
                warn!(
                    policy = policy.name(),
                    error = %store_error,
                    "admission store unavailable, failing open"
                );
                AdmissionDecision::degraded(policy.quota())
            }
            Err(other_error) => {
                error!(
                    policy = policy.name(),
                    error = %other_error,
                    "admission decision failed, failing open"
                );
                AdmissionDecision::degraded(policy.quota())
            }
        };

        if !decision.allowed {
            debug!(
                policy = policy.name(),
                retry_after_ms = decision.reset_after_ms,
                "admission denied"
            );
        }

        self.stats.record(&decision);
        Ok(decision)
    }
}
