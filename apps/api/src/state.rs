use std::sync::Arc;

use storefront_application::AdmissionService;

use crate::client_origin::TrustedProxies;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub admission_service: AdmissionService,
    pub trusted_proxies: Arc<TrustedProxies>,
    pub redis_client: Option<redis::Client>,
}
