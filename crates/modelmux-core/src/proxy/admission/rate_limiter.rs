use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use modelmux_types::{GatewayConfig, RateLimitSetting, User};

use crate::utils::now_ms;

#[derive(Debug, Clone, Copy)]
struct RateBucket {
    window_start: i64,
    count: u64,
}

/// Rejected attempt: the window is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub retry_after_ms: u64,
}

/// Snapshot row for the operator API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RateBucketView {
    pub user_id: String,
    pub provider: String,
    pub window_start: i64,
    pub count: u64,
}

/// Fixed-window limiter keyed by (user id, provider).
#[derive(Debug)]
pub struct RateLimiter {
    default_limit: RateLimitSetting,
    buckets: DashMap<(String, String), RateBucket>,
}

impl RateLimiter {
    pub fn new(default_limit: RateLimitSetting) -> Self {
        Self { default_limit, buckets: DashMap::new() }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(RateLimitSetting {
            max: config.user_rate_limit_max,
            window_ms: config.user_rate_limit_window_ms,
        })
    }

    /// Per-provider override > per-user default > global default.
    pub fn effective_limit(&self, user: &User, provider: &str) -> RateLimitSetting {
        user.provider_rate_limits
            .get(provider)
            .copied()
            .or(user.rate_limit)
            .unwrap_or(self.default_limit)
    }

    pub fn check(&self, user: &User, provider: &str) -> Result<(), RateLimitRejection> {
        self.check_at(user, provider, now_ms())
    }

    /// Count one attempt, or reject it when the window is already full.
    pub fn check_at(&self, user: &User, provider: &str, now: i64) -> Result<(), RateLimitRejection> {
        let limit = self.effective_limit(user, provider);
        if limit.max <= 0 {
            return Ok(());
        }
        let max = limit.max as u64;
        let window_ms = limit.window_ms as i64;

        let mut bucket = self
            .buckets
            .entry((user.id.clone(), provider.to_string()))
            .or_insert(RateBucket { window_start: now, count: 0 });

        let elapsed = now - bucket.window_start;
        if elapsed >= window_ms {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= max {
            let retry_after_ms = (window_ms - (now - bucket.window_start)).max(0) as u64;
            debug!(
                user_id = %user.id,
                provider = %provider,
                count = bucket.count,
                max,
                retry_after_ms,
                "Rate limit window full"
            );
            return Err(RateLimitRejection { retry_after_ms });
        }

        bucket.count += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<RateBucketView> {
        let mut rows: Vec<RateBucketView> = self
            .buckets
            .iter()
            .map(|entry| {
                let (user_id, provider) = entry.key();
                RateBucketView {
                    user_id: user_id.clone(),
                    provider: provider.clone(),
                    window_start: entry.value().window_start,
                    count: entry.value().count,
                }
            })
            .collect();
        rows.sort_by(|a, b| (&a.user_id, &a.provider).cmp(&(&b.user_id, &b.provider)));
        rows
    }
}
