//! # modelmux Core
//!
//! Routing decision engine and resilient execution pipeline.
//!
//! ```text
//! modelmux-core/src/proxy/
//! ├── intent.rs        # intent classifier
//! ├── strategy.rs      # fallback provider selection
//! ├── routing/         # explicit-model, custom rules, heuristics
//! ├── health/          # health tracker / suppression
//! ├── admission/       # quota, rate limiter, model allow/deny
//! ├── retry/           # backoff + retryable classification
//! ├── executor/        # candidate loop, retry loop, stream pump
//! ├── stream_guard.rs  # loop-artifact filter + output cap
//! ├── collaborators/   # registry, settings, users, usage, audit
//! └── server.rs        # AppState + axum router
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "Mutex guards in tracker code are scoped explicitly"
)]
#![allow(
    clippy::redundant_else,
    reason = "Explicit else blocks improve readability in complex control flow"
)]
#![allow(clippy::needless_continue, reason = "Explicit continue improves loop readability")]
#![allow(
    clippy::derive_partial_eq_without_eq,
    reason = "Some types intentionally don't implement Eq"
)]
// Test-only lints: allow panic!, println!, etc. in test code
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::float_cmp,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::assertions_on_result_states
    )
)]

pub mod error;
pub mod proxy;
pub mod utils;

// Re-export commonly used types
pub use error::{AppError, AppResult};
pub use proxy::{build_proxy_router, AppState, Collaborators};
