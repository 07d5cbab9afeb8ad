//! Authenticated caller record consumed by routing and admission control.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed-window rate limit setting. `max <= 0` disables limiting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitSetting {
    pub max: i64,
    pub window_ms: u64,
}

/// Cumulative usage limits. `0` means unlimited.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaLimits {
    #[serde(default)]
    pub max_requests: u64,
    #[serde(default)]
    pub max_prompt_tokens: u64,
    #[serde(default)]
    pub max_completion_tokens: u64,
}

/// Persisted usage totals.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageTotals {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_prompt_tokens: u64,
    #[serde(default)]
    pub total_completion_tokens: u64,
}

/// Highest usage-webhook threshold (percent) already notified, per dimension.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifiedWatermarks {
    #[serde(default)]
    pub requests: u32,
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Billing {
    #[serde(default)]
    pub limits: QuotaLimits,
    #[serde(default)]
    pub totals: UsageTotals,
    #[serde(default)]
    pub last_notified: NotifiedWatermarks,
}

/// A gateway user as attached by the auth layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Bearer tokens accepted for this user
    #[serde(default, skip_serializing)]
    pub api_keys: Vec<String>,
    /// Empty = every registered provider
    #[serde(default)]
    pub allowed_providers: Vec<String>,
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub denied_models: Vec<String>,
    #[serde(default)]
    pub provider_allowed_models: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub provider_denied_models: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSetting>,
    #[serde(default)]
    pub provider_rate_limits: HashMap<String, RateLimitSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,
    /// Requested model (or `prefix*`) -> provider name
    #[serde(default)]
    pub model_routing: HashMap<String, String>,
    #[serde(default)]
    pub billing: Billing,
}

impl User {
    /// Allowed-provider filter, `None` when unrestricted.
    pub fn provider_filter(&self) -> Option<&[String]> {
        if self.allowed_providers.is_empty() {
            None
        } else {
            Some(&self.allowed_providers)
        }
    }
}
