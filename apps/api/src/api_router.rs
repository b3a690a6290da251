use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Extension, Router};
use storefront_application::PolicyRegistry;
use storefront_core::AppError;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{self, AdmissionRoute};
use crate::state::AppState;

/// Policy whose quota follows the phone number being verified.
pub const PHONE_VERIFY_POLICY: &str = "phoneVerify";
const PHONE_NUMBER_FIELD: &str = "phoneNumber";

/// Returns the admission route of every registered policy.
pub fn admission_routes(registry: &PolicyRegistry) -> Vec<AdmissionRoute> {
    registry
        .policies()
        .map(|policy| {
            let route = AdmissionRoute::new(policy.name());
            if policy.name() == PHONE_VERIFY_POLICY {
                route.with_body_field(PHONE_NUMBER_FIELD)
            } else {
                route
            }
        })
        .collect()
}

pub fn build_router(app_state: AppState) -> Result<Router, AppError> {
    let registry = app_state.admission_service.registry();
    registry.require_all([PHONE_VERIFY_POLICY])?;

    let mut router = Router::new().route("/health", get(handlers::health::health_handler));

    for route in admission_routes(registry) {
        let path = format!("/api/admission/{}", route.policy());
        let protected = Router::new()
            .route(&path, post(handlers::admission::admission_handler))
            .route_layer(from_fn_with_state(
                app_state.clone(),
                middleware::enforce_admission,
            ))
            .layer(Extension(route));

        router = router.merge(protected);
    }

    Ok(router
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
