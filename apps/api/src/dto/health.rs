use serde::Serialize;
use storefront_application::AdmissionStatsSnapshot;
use ts_rs::TS;

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub store: HealthDependencyStatus,
    pub admission: AdmissionStatsResponse,
}

/// One runtime dependency health status.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-dependency-status.ts"
)]
pub struct HealthDependencyStatus {
    pub status: &'static str,
    pub detail: Option<String>,
}

/// Admission outcome counters since process start.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/admission-stats-response.ts"
)]
pub struct AdmissionStatsResponse {
    #[ts(type = "number")]
    pub allowed: u64,
    #[ts(type = "number")]
    pub denied: u64,
    #[ts(type = "number")]
    pub degraded: u64,
}

impl From<AdmissionStatsSnapshot> for AdmissionStatsResponse {
    fn from(value: AdmissionStatsSnapshot) -> Self {
        Self {
            allowed: value.allowed,
            denied: value.denied,
            degraded: value.degraded,
        }
    }
}
