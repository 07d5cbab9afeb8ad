use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use modelmux_core::proxy::admission::RateBucketView;
use modelmux_core::utils::now_ms;
use modelmux_types::models::ProviderHealthView;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatusResponse {
    pub providers: Vec<ProviderHealthView>,
    pub suppressed: usize,
    pub overall_healthy: bool,
}

pub async fn get_health_status(State(state): State<AppState>) -> Json<HealthStatusResponse> {
    let providers = state.health().snapshot();
    let suppressed = providers.iter().filter(|p| p.suppressed).count();
    Json(HealthStatusResponse { providers, suppressed, overall_healthy: suppressed == 0 })
}

#[derive(Debug, Deserialize)]
pub struct SuppressRequest {
    pub provider: String,
    /// Suppression length; omitted means until cleared
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct SuppressResponse {
    pub provider: String,
    pub until: Option<i64>,
}

pub async fn suppress_provider(State(state): State<AppState>, Json(req): Json<SuppressRequest>) -> Response {
    let provider = req.provider.trim();
    if provider.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "provider is required"})))
            .into_response();
    }

    let until = req.ttl_ms.map(|ttl| now_ms().saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX)));
    state.health().suppress(provider, until);
    Json(SuppressResponse { provider: provider.to_string(), until }).into_response()
}

pub async fn clear_suppression(State(state): State<AppState>, Path(provider): Path<String>) -> StatusCode {
    if state.health().clear_suppression(&provider) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Serialize)]
pub struct RateLimitsResponse {
    pub buckets: Vec<RateBucketView>,
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitsResponse> {
    Json(RateLimitsResponse { buckets: state.rate_limiter().snapshot() })
}
