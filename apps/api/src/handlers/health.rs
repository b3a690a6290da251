use std::time::Duration;

use axum::Json;
use axum::extract::State;
use redis::AsyncCommands;

use crate::dto::{AdmissionStatsResponse, HealthDependencyStatus, HealthResponse};
use crate::state::AppState;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Reports store reachability and admission counters.
///
/// A failed store leaves the service `degraded` but still ready, since
/// admission fails open and keeps serving traffic.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = check_redis(state.redis_client.clone()).await;
    let admission = AdmissionStatsResponse::from(state.admission_service.stats().snapshot());

    let status = if store.status == "error" {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        ready: true,
        store,
        admission,
    })
}

async fn check_redis(redis_client: Option<redis::Client>) -> HealthDependencyStatus {
    let Some(redis_client) = redis_client else {
        return HealthDependencyStatus {
            status: "disabled",
            detail: Some("in-memory counter store".to_owned()),
        };
    };

    let ping = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, async move {
        let mut connection = redis_client.get_multiplexed_async_connection().await?;
        connection.ping::<String>().await
    })
    .await;

    match ping {
        Ok(Ok(value)) if value.eq_ignore_ascii_case("pong") => HealthDependencyStatus {
            status: "ok",
            detail: None,
        },
        Ok(Ok(value)) => HealthDependencyStatus {
            status: "error",
            detail: Some(format!("unexpected redis ping response: {value}")),
        },
        Ok(Err(error)) => HealthDependencyStatus {
            status: "error",
            detail: Some(format!("redis ping failed: {error}")),
        },
        Err(_) => HealthDependencyStatus {
            status: "error",
            detail: Some(format!("redis ping timed out after {}ms", HEALTH_CHECK_TIMEOUT.as_millis())),
        },
    }
}
