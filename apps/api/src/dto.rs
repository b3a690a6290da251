mod admission;
mod health;

pub use admission::{AdmissionDecisionResponse, RateLimitExceededResponse};
pub use health::{AdmissionStatsResponse, HealthDependencyStatus, HealthResponse};
