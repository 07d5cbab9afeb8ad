//! # modelmux Types
//!
//! Core types, models, and error definitions for the modelmux gateway.
//!
//! This crate provides the foundational type system for the workspace:
//!
//! - **`error`** - Typed error hierarchy for proxy and configuration failures
//! - **`models`** - Domain models (Provider, User, RoutingRule, Candidate, health records)
//! - **`protocol`** - OpenAI chat-completions message types
//!
//! ## Architecture Role
//!
//! `modelmux-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!                modelmux-types (this crate)
//!                        │
//!                        ▼
//!                  modelmux-core
//!                        │
//!                        ▼
//!                 modelmux-server
//! ```

pub mod error;
pub mod models;
pub mod protocol;

// Re-export error types for convenience
pub use error::{ConfigError, ProxyError, Result, TypedError};

// Re-export core model types
pub use models::{
    Billing, Candidate, GatewayConfig, HealthRecord, Provider, ProviderConfig, ProviderStrategy,
    QuotaLimits, RateLimitSetting, RouteDecision, RoutingMode, RoutingRule, RoutingSettings,
    SuppressionEntry, SuppressionReason, UsageTotals, User,
};
