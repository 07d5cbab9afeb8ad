//! Application State
//!
//! Wraps the gateway state from `modelmux-core` together with what the
//! operator API needs to know about the loaded gateway file.

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;

use modelmux_core::proxy::admission::RateLimiter;
use modelmux_core::proxy::collaborators::{
    InMemoryUserStore, StaticProviderRegistry, StaticRoutingSettings, TracingAuditSink,
};
use modelmux_core::proxy::HealthTracker;
use modelmux_core::{build_proxy_router, Collaborators};
use modelmux_types::GatewayConfig;

use crate::gateway_file::GatewayFile;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub gateway: modelmux_core::AppState,
    pub provider_names: Vec<String>,
    pub user_count: usize,
    pub started_at: Instant,
}

impl AppState {
    /// Build the in-memory collaborators from `file` and wire the gateway.
    pub fn from_gateway_file(config: GatewayConfig, file: GatewayFile) -> Result<Self> {
        let provider_names = file.providers.iter().map(|p| p.name.clone()).collect();
        let user_count = file.users.len();

        let store = Arc::new(InMemoryUserStore::new(file.users));
        let collaborators = Collaborators {
            registry: Arc::new(StaticProviderRegistry::new(file.providers)),
            settings: Arc::new(StaticRoutingSettings::new(file.routing)),
            users: store.clone(),
            usage: store,
            audit: Arc::new(TracingAuditSink),
        };
        let gateway = modelmux_core::AppState::new(config, collaborators)
            .map_err(|e| anyhow::anyhow!("Failed to initialize gateway: {}", e))?;

        Ok(Self {
            inner: Arc::new(AppStateInner { gateway, provider_names, user_count, started_at: Instant::now() }),
        })
    }

    pub fn gateway(&self) -> &modelmux_core::AppState {
        &self.inner.gateway
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.inner.gateway.health
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.gateway.rate_limiter
    }

    pub fn provider_names(&self) -> &[String] {
        &self.inner.provider_names
    }

    pub fn user_count(&self) -> usize {
        self.inner.user_count
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    pub fn build_proxy_router(&self) -> Router {
        build_proxy_router(self.inner.gateway.clone())
    }
}
