use axum::{Extension, Json};
use storefront_domain::AdmissionDecision;

use crate::dto::AdmissionDecisionResponse;

/// Answers a collaborator whose request passed admission.
pub async fn admission_handler(
    Extension(decision): Extension<AdmissionDecision>,
) -> Json<AdmissionDecisionResponse> {
    Json(AdmissionDecisionResponse::from(decision))
}
