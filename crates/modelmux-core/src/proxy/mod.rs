//! Proxy module - routing decision engine and resilient execution pipeline
//!
//! Request flow: intent classifier -> routing engine (strategy selector as
//! fallback) -> health filter -> resilient executor (admission control per
//! attempt) -> stream guard on the response path.

pub mod admission;
pub mod collaborators;
pub mod executor;
pub mod handlers;
pub mod health;
pub mod intent;
pub mod middleware;
pub mod retry;
pub mod routing;
pub mod server;
pub mod strategy;
pub mod stream_guard;
pub mod upstream;
pub mod webhook;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use executor::{ExecutionOutcome, ExecutionRequest, ResilientExecutor};
pub use health::{HealthConfig, HealthTracker};
pub use routing::{RouteRequest, RoutingEngine};
pub use server::{build_proxy_router, AppState, Collaborators};
pub use strategy::StrategySelector;
