//! Operator API
//!
//! Mounted under `/api` behind the admin key.

mod resilience;


use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/resilience/health", get(resilience::get_health_status))
        .route("/resilience/suppress", post(resilience::suppress_provider))
        .route("/resilience/suppress/:provider", delete(resilience::clear_suppression))
        .route("/resilience/rate-limits", get(resilience::get_rate_limits))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub providers: Vec<String>,
    pub users: usize,
    pub strategy: modelmux_types::ProviderStrategy,
    pub routing_mode: modelmux_types::RoutingMode,
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let config = &state.gateway().config;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        providers: state.provider_names().to_vec(),
        users: state.user_count(),
        strategy: config.strategy,
        routing_mode: config.routing_mode,
    })
}
