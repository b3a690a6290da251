//! Storefront admission control service.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod client_origin;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;

use storefront_core::AppError;
use tracing::info;

use crate::api_config::{ApiConfig, init_tracing};
use crate::api_router::build_router;
use crate::api_services::build_app_state;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;
    let app_state = build_app_state(&config)?;

    for policy in app_state.admission_service.registry().policies() {
        info!(
            policy = policy.name(),
            quota = policy.quota(),
            window_seconds = policy.window_seconds(),
            penalty_seconds = policy.penalty_seconds(),
            "admission policy loaded"
        );
    }

    let app = build_router(app_state)?;

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "storefront-admission-api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
