//! Admission policy definitions.

use storefront_core::{AppError, AppResult, NonEmptyString};

/// Built-in storefront policies as `(name, quota, window_seconds, penalty_seconds)`.
///
/// These values are the published contract of the storefront; deployments
/// adjust them through configuration rather than by editing this table.
pub const DEFAULT_POLICY_TABLE: [(&str, u32, u32, u32); 8] = [
    ("auth", 20, 60, 60),
    ("sensitive", 5, 3600, 3600),
    ("address", 30, 60, 60),
    ("cart", 60, 60, 30),
    ("webhook", 100, 60, 60),
    ("game", 30, 60, 60),
    ("chat", 20, 60, 60),
    ("phoneVerify", 5, 600, 600),
];

/// Quota configuration for one category of protected operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: NonEmptyString,
    quota: u32,
    window_seconds: u32,
    penalty_seconds: u32,
}

impl Policy {
    /// Creates a validated policy.
    ///
    /// Quota, window and penalty must all be positive. A penalty shorter
    /// than the window is allowed.
    pub fn new(
        name: impl Into<String>,
        quota: u32,
        window_seconds: u32,
        penalty_seconds: u32,
    ) -> AppResult<Self> {
        let name = NonEmptyString::new(name).map_err(|_| {
            AppError::Validation("policy name must not be empty".to_owned())
        })?;

        if name
            .as_str()
            .chars()
            .any(|character| character.is_whitespace() || character == ':')
        {
            return Err(AppError::Validation(format!(
                "policy name '{}' must not contain whitespace or ':'",
                name.as_str()
            )));
        }

        if quota == 0 {
            return Err(AppError::Validation(format!(
                "policy '{}' quota must be greater than zero",
                name.as_str()
            )));
        }

        if window_seconds == 0 {
            return Err(AppError::Validation(format!(
                "policy '{}' window_seconds must be greater than zero",
                name.as_str()
            )));
        }

        if penalty_seconds == 0 {
            return Err(AppError::Validation(format!(
                "policy '{}' penalty_seconds must be greater than zero",
                name.as_str()
            )));
        }

        Ok(Self {
            name,
            quota,
            window_seconds,
            penalty_seconds,
        })
    }

    /// Returns the unique policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the maximum number of operations per window.
    #[must_use]
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Returns the accounting window length in seconds.
    #[must_use]
    pub fn window_seconds(&self) -> u32 {
        self.window_seconds
    }

    /// Returns the denial period imposed once the quota is exceeded.
    #[must_use]
    pub fn penalty_seconds(&self) -> u32 {
        self.penalty_seconds
    }

    /// Returns the accounting window length in milliseconds.
    #[must_use]
    pub fn window_ms(&self) -> u64 {
        u64::from(self.window_seconds) * 1000
    }

    /// Returns the penalty length in milliseconds.
    #[must_use]
    pub fn penalty_ms(&self) -> u64 {
        u64::from(self.penalty_seconds) * 1000
    }
}

/// Builds the built-in storefront policy set.
pub fn default_policies() -> AppResult<Vec<Policy>> {
    DEFAULT_POLICY_TABLE
        .iter()
        .map(|(name, quota, window_seconds, penalty_seconds)| {
            Policy::new(*name, *quota, *window_seconds, *penalty_seconds)
        })
        .collect()
}
