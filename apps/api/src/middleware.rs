use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use storefront_core::AppError;
use storefront_domain::{AdmissionDecision, IdentityKey};

use crate::client_origin::{client_origin, header_value, peer_address};
use crate::dto::RateLimitExceededResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const ADMISSION_KEY: HeaderName = HeaderName::from_static("x-admission-key");

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;

/// Where a route takes its override key from, besides the
/// `X-Admission-Key` header.
///
/// The header is only honoured from peers the proxy list trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKeySource {
    HeaderOnly,
    JsonBodyField(&'static str),
}

/// Admission settings attached to a protected route.
#[derive(Debug, Clone)]
pub struct AdmissionRoute {
    policy: String,
    override_key: OverrideKeySource,
}

impl AdmissionRoute {
    pub fn new(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            override_key: OverrideKeySource::HeaderOnly,
        }
    }

    /// Keys quota on a string field of the JSON request body.
    pub fn with_body_field(mut self, field: &'static str) -> Self {
        self.override_key = OverrideKeySource::JsonBodyField(field);
        self
    }

    pub fn policy(&self) -> &str {
        self.policy.as_str()
    }
}

/// Admits or rejects one request under the route's policy.
///
/// Allowed requests carry the [`AdmissionDecision`] as a request extension
/// and get `X-RateLimit-Remaining` on the response.
pub async fn enforce_admission(
    State(state): State<AppState>,
    Extension(route): Extension<AdmissionRoute>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let origin = client_origin(
        request.headers(),
        request.extensions(),
        state.trusted_proxies.as_ref(),
    );

    let header_key = if state
        .trusted_proxies
        .trusts(peer_address(request.extensions()))
    {
        header_value(request.headers(), ADMISSION_KEY.as_str())
    } else {
        None
    };

    let (override_key, mut request) = match route.override_key {
        OverrideKeySource::JsonBodyField(field) => {
            let (body_key, request) = buffered_body_field(request, field).await?;
            (body_key.or(header_key), request)
        }
        OverrideKeySource::HeaderOnly => (header_key, request),
    };

    let key = IdentityKey::resolve(&origin, override_key.as_deref());
    let decision = state
        .admission_service
        .check(route.policy(), &key)
        .await?;

    if !decision.allowed {
        return Ok(rate_limited_response(&decision));
    }

    request.extensions_mut().insert(decision);
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining_quota));

    Ok(response)
}

fn rate_limited_response(decision: &AdmissionDecision) -> Response {
    let retry_after = decision.retry_after_seconds();
    let reset_at = decision.reset_at_epoch_ms(Utc::now().timestamp_millis());

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitExceededResponse::new(retry_after)),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(0_u32));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset_at));

    response
}

async fn buffered_body_field(
    request: Request,
    field: &str,
) -> ApiResult<(Option<String>, Request)> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BUFFERED_BODY_BYTES)
        .await
        .map_err(|error| AppError::Validation(format!("failed to read request body: {error}")))?;

    let value = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|body| {
            body.get(field)
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
        });

    Ok((value, Request::from_parts(parts, Body::from(bytes))))
}
