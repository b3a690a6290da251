//! Immutable registry of admission policies.

use std::collections::BTreeMap;

use storefront_core::{AppError, AppResult};
use storefront_domain::Policy;

/// Process-wide policy table, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Policy>,
}

impl PolicyRegistry {
    /// Builds a registry, rejecting duplicate policy names.
    pub fn new(policies: impl IntoIterator<Item = Policy>) -> AppResult<Self> {
        let mut registered = BTreeMap::new();

        for policy in policies {
            let name = policy.name().to_owned();
            if registered.insert(name.clone(), policy).is_some() {
                return Err(AppError::Validation(format!(
                    "policy '{name}' is registered more than once"
                )));
            }
        }

        Ok(Self {
            policies: registered,
        })
    }

    /// Returns the policy registered under `name`.
    pub fn get(&self, name: &str) -> AppResult<&Policy> {
        self.policies
            .get(name)
            .ok_or_else(|| AppError::PolicyNotFound(name.to_owned()))
    }

    /// Verifies that every policy a caller is wired to exists.
    ///
    /// Meant for startup so a missing policy aborts the process instead of
    /// surfacing on the first protected request.
    pub fn require_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> AppResult<()> {
        for name in names {
            self.get(name)?;
        }

        Ok(())
    }

    /// Returns all policies ordered by name.
    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    /// Returns the number of registered policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns whether no policy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
