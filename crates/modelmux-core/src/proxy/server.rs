use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use modelmux_types::GatewayConfig;

use crate::error::AppResult;
use crate::proxy::admission::{QuotaManager, RateLimiter};
use crate::proxy::collaborators::{
    AuditSink, ProviderRegistry, RoutingSettingsSource, UsageStore, UserDirectory,
};
use crate::proxy::executor::ResilientExecutor;
use crate::proxy::health::{HealthConfig, HealthTracker};
use crate::proxy::routing::RoutingEngine;
use crate::proxy::strategy::StrategySelector;
use crate::proxy::upstream::UpstreamClient;
use crate::proxy::webhook::{WebhookNotifier, WebhookTarget};
use crate::utils::http::build_http_client;

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// External storage the gateway talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn ProviderRegistry>,
    pub settings: Arc<dyn RoutingSettingsSource>,
    pub users: Arc<dyn UserDirectory>,
    pub usage: Arc<dyn UsageStore>,
    pub audit: Arc<dyn AuditSink>,
}

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub collaborators: Collaborators,
    pub health: Arc<HealthTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub quota: Arc<QuotaManager>,
    pub selector: Arc<StrategySelector>,
    pub routing: Arc<RoutingEngine>,
    pub executor: Arc<ResilientExecutor>,
}

impl AppState {
    /// Wire the process-wide trackers around `collaborators`.
    pub fn new(config: GatewayConfig, collaborators: Collaborators) -> AppResult<Self> {
        config.check()?;
        let config = Arc::new(config);
        let http_client = build_http_client(CONNECT_TIMEOUT_SECS)?;
        let notifier = WebhookNotifier::new(http_client.clone());
        let webhook = |url: &Option<String>| url.as_ref().map(|u| WebhookTarget::new(notifier.clone(), u.clone()));

        let health = Arc::new(
            HealthTracker::new(HealthConfig::from(config.as_ref()))
                .with_webhook(webhook(&config.health_webhook_url)),
        );
        let rate_limiter = Arc::new(RateLimiter::from_config(&config));
        let quota = Arc::new(
            QuotaManager::new(collaborators.usage.clone(), config.usage_webhook_thresholds.clone())
                .with_webhook(webhook(&config.usage_webhook_url)),
        );
        let selector = Arc::new(StrategySelector::new(config.strategy));
        let routing = Arc::new(RoutingEngine::new(config.clone(), selector.clone()));
        let executor = Arc::new(ResilientExecutor::new(
            config.clone(),
            collaborators.registry.clone(),
            health.clone(),
            rate_limiter.clone(),
            quota.clone(),
            collaborators.usage.clone(),
            collaborators.audit.clone(),
            UpstreamClient::new(http_client, config.default_timeout_secs),
        ));

        info!(
            strategy = ?config.strategy,
            routing_mode = ?config.routing_mode,
            retry_max = config.retry_max,
            failover_on_429 = config.failover_on_429,
            "Gateway state initialized"
        );

        Ok(Self { config, collaborators, health, rate_limiter, quota, selector, routing, executor })
    }
}

/// Client-facing router: `/v1/chat/completions` and `/v1/models`, behind auth.
pub fn build_proxy_router(state: AppState) -> Router<()> {
    use crate::proxy::handlers;

    Router::new()
        .route("/v1/models", get(handlers::handle_list_models))
        .route("/v1/chat/completions", post(handlers::handle_chat_completions))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::proxy::middleware::auth_middleware,
        ))
        .with_state(state)
}
