//! Domain models for the gateway.

pub mod config;
pub mod health;
pub mod provider;
pub mod routing;
pub mod user;

pub use config::{GatewayConfig, ModelTier, ProviderStrategy, RoutingMode, TierModels};
pub use health::{HealthRecord, ProviderHealthView, SuppressionEntry, SuppressionReason};
pub use provider::{Provider, ProviderConfig};
pub use routing::{Candidate, RouteDecision, RoutingRule, RoutingSettings, AUTO_MODEL_TOKENS};
pub use user::{Billing, NotifiedWatermarks, QuotaLimits, RateLimitSetting, UsageTotals, User};
