//! External collaborator interfaces consumed by the core.
//!
//! The core never owns provider, user, settings or audit storage. It talks to
//! these traits; the server wires in the in-memory/static implementations
//! below.

mod audit;
mod memory;
mod registry;
mod settings;

pub use audit::TracingAuditSink;
pub use memory::InMemoryUserStore;
pub use registry::StaticProviderRegistry;
pub use settings::StaticRoutingSettings;

use async_trait::async_trait;
use serde::Serialize;

use modelmux_types::{Billing, Provider, ProviderConfig, RoutingSettings, User};

use crate::proxy::executor::AuditEntry;

/// Source of registered upstream providers.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// All providers, restricted to `allowed` names when given.
    async fn get_all_providers(&self, allowed: Option<&[String]>) -> Vec<Provider>;

    /// Resolved config for one provider, `None` if unknown or not allowed.
    async fn get_provider_config(
        &self,
        name: &str,
        allowed: Option<&[String]>,
    ) -> Option<ProviderConfig>;
}

/// Persisted routing settings.
#[async_trait]
pub trait RoutingSettingsSource: Send + Sync {
    async fn get_routing_settings(&self) -> RoutingSettings;
}

/// Bearer token -> user lookup used by the auth middleware.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Option<User>;
}

/// Which provider/model served a request, for per-token accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEvent {
    pub provider: String,
    pub model: String,
}

/// Billing persistence.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Latest persisted billing, `None` when the store has no record.
    async fn load_billing(&self, user_id: &str) -> Option<Billing>;

    async fn save_billing(&self, user_id: &str, billing: &Billing);

    /// Per-token request counter.
    async fn record_user_usage(&self, user_id: &str, token: &str, event: &UsageEvent);
}

/// Fire-and-forget audit trail.
pub trait AuditSink: Send + Sync {
    fn record_audit(&self, entry: AuditEntry);
}
