use serde::Serialize;
use storefront_domain::AdmissionDecision;
use ts_rs::TS;

/// Admission decision returned to collaborators on allowed requests.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/admission-decision-response.ts"
)]
pub struct AdmissionDecisionResponse {
    pub allowed: bool,
    pub remaining_quota: u32,
    #[ts(type = "number")]
    pub reset_after_ms: u64,
    pub degraded: bool,
}

impl From<AdmissionDecision> for AdmissionDecisionResponse {
    fn from(value: AdmissionDecision) -> Self {
        Self {
            allowed: value.allowed,
            remaining_quota: value.remaining_quota,
            reset_after_ms: value.reset_after_ms,
            degraded: value.degraded,
        }
    }
}

/// Body of a `429 Too Many Requests` response.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/rate-limit-exceeded-response.ts"
)]
pub struct RateLimitExceededResponse {
    pub error: &'static str,
    pub message: &'static str,
    #[ts(type = "number")]
    pub retry_after: u64,
}

impl RateLimitExceededResponse {
    pub fn new(retry_after: u64) -> Self {
        Self {
            error: "Too Many Requests",
            message: "Rate limit exceeded. Please try again later.",
            retry_after,
        }
    }
}
