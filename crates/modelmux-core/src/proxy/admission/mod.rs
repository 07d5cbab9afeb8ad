//! Admission control: checks that gate every attempt before the network.
//!
//! - [`QuotaManager`] - cumulative per-user limits and usage persistence
//! - [`RateLimiter`] - fixed window per (user, provider)
//! - [`is_model_allowed`] - per-provider and global allow/deny lists

mod model_access;
mod quota;
mod rate_limiter;


pub use model_access::{is_model_allowed, model_matches};
pub use quota::{
    estimate_prompt_tokens, QuotaEstimate, QuotaManager, QuotaViolation, UsageReport,
};
pub use rate_limiter::{RateBucketView, RateLimitRejection, RateLimiter};
