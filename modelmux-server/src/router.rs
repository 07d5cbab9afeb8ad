use axum::{http::StatusCode, middleware, response::IntoResponse, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;
use modelmux_core::proxy::middleware::admin_auth_middleware;

pub fn build_router(state: AppState) -> Router {
    let proxy_router = state.build_proxy_router();

    let protected_api = Router::<AppState>::new()
        .nest("/api", api::router())
        .layer(middleware::from_fn_with_state(state.gateway().clone(), admin_auth_middleware));

    let public_routes = Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/version", get(version_info));

    // The proxy router carries its own TraceLayer.
    protected_api
        .merge(public_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .merge(proxy_router)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, axum::Json(serde_json::json!({"status": "ok"})))
}

async fn version_info() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "version": option_env!("GIT_VERSION").unwrap_or("dev"),
            "build_time": option_env!("BUILD_TIME").unwrap_or("unknown"),
            "cargo_version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
