//! Gateway tunables.
//!
//! Every knob has a default and can be overridden from the environment with
//! the names listed on [`GatewayConfig::from_env`]. Bad values are logged and
//! replaced by the default; struct-level checks run through `validator`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::error::ConfigError;

/// Fallback provider selection strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderStrategy {
    #[default]
    RoundRobin,
    Cheapest,
    Fastest,
    Random,
    /// First eligible provider
    First,
}

impl FromStr for ProviderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "roundrobin" | "rr" => Ok(Self::RoundRobin),
            "cheapest" => Ok(Self::Cheapest),
            "fastest" => Ok(Self::Fastest),
            "random" => Ok(Self::Random),
            "first" | "default" => Ok(Self::First),
            other => Err(format!("unknown provider strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Auto,
    Off,
}

impl FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "on" => Ok(Self::Auto),
            "off" | "disabled" => Ok(Self::Off),
            other => Err(format!("unknown routing mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Strong,
    Fast,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierModels {
    pub strong: String,
    pub fast: String,
}

fn default_model_tiers() -> HashMap<String, TierModels> {
    let tier = |strong: &str, fast: &str| TierModels { strong: strong.into(), fast: fast.into() };
    HashMap::from([
        ("openai".to_string(), tier("gpt-4o", "gpt-4o-mini")),
        ("groq".to_string(), tier("llama-3.3-70b-versatile", "llama-3.1-8b-instant")),
        ("anthropic".to_string(), tier("claude-3-5-sonnet-latest", "claude-3-5-haiku-latest")),
    ])
}

/// Full gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_retry_window"))]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Configuration struct - bools are intentional feature flags"
)]
pub struct GatewayConfig {
    /// Port to listen on
    #[validate(range(min = 1_u16))]
    pub port: u16,
    /// Bind to 0.0.0.0 instead of loopback
    pub allow_lan_access: bool,
    /// Retries per provider after the first attempt
    #[validate(range(max = 10_u32))]
    pub retry_max: u32,
    #[validate(range(min = 1_u64))]
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub failover_on_429: bool,
    pub strategy: ProviderStrategy,
    #[validate(range(min = 1_u32))]
    pub auto_suppress_fails: u32,
    pub auto_suppress_ttl_ms: u64,
    pub auto_suppress_unhealthy: bool,
    pub routing_mode: RoutingMode,
    #[validate(url)]
    pub health_webhook_url: Option<String>,
    #[validate(url)]
    pub usage_webhook_url: Option<String>,
    /// Percent-of-limit thresholds, ascending
    pub usage_webhook_thresholds: Vec<u32>,
    /// Default per user+provider window max, `<= 0` disables
    pub user_rate_limit_max: i64,
    #[validate(range(min = 1_u64))]
    pub user_rate_limit_window_ms: u64,
    /// Upstream timeout when the provider does not set one
    #[validate(range(min = 1_u64, max = 3600_u64))]
    pub default_timeout_secs: u64,
    /// Last-resort model when nothing else names one
    pub fallback_model: String,
    /// Provider base name -> strong/fast model names used by heuristics
    pub model_tiers: HashMap<String, TierModels>,
    /// Required on `/api` when set
    #[serde(default, skip_serializing)]
    pub admin_key: Option<String>,
}

fn validate_retry_window(config: &GatewayConfig) -> Result<(), ValidationError> {
    if config.retry_base_ms > config.retry_max_ms {
        return Err(ValidationError::new("retry_base_exceeds_max"));
    }
    Ok(())
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8045,
            allow_lan_access: false,
            retry_max: 2,
            retry_base_ms: 500,
            retry_max_ms: 4000,
            failover_on_429: true,
            strategy: ProviderStrategy::RoundRobin,
            auto_suppress_fails: 3,
            auto_suppress_ttl_ms: 600_000,
            auto_suppress_unhealthy: true,
            routing_mode: RoutingMode::Auto,
            health_webhook_url: None,
            usage_webhook_url: None,
            usage_webhook_thresholds: vec![80, 100],
            user_rate_limit_max: 0,
            user_rate_limit_window_ms: 60_000,
            default_timeout_secs: 60,
            fallback_model: "gpt-4o-mini".to_string(),
            model_tiers: default_model_tiers(),
            admin_key: None,
        }
    }
}

impl GatewayConfig {
    /// Load from process environment.
    ///
    /// Recognised: `MODELMUX_PORT`, `MODELMUX_ALLOW_LAN`, `RETRY_MAX`,
    /// `PROXY_RETRY_BASE_MS`, `PROXY_RETRY_MAX_MS`, `PROXY_FAILOVER_ON_429`,
    /// `PROVIDER_STRATEGY`, `AUTO_SUPPRESS_FAILS`, `AUTO_SUPPRESS_TTL_MS`,
    /// `AUTO_SUPPRESS_UNHEALTHY`, `ROUTING_MODE`, `HEALTH_WEBHOOK_URL`,
    /// `USAGE_WEBHOOK_URL`, `USAGE_WEBHOOK_THRESHOLDS`, `USER_RATE_LIMIT_MAX`,
    /// `USER_RATE_LIMIT_WINDOW_MS`, `PROXY_DEFAULT_TIMEOUT_SECS`,
    /// `PROXY_FALLBACK_MODEL`, `MODEL_TIER_<PROVIDER>_STRONG|FAST`,
    /// `MODELMUX_ADMIN_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Load from an arbitrary key lookup (tests feed a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        parse_into(&lookup, "MODELMUX_PORT", &mut config.port);
        parse_bool_into(&lookup, "MODELMUX_ALLOW_LAN", &mut config.allow_lan_access);
        parse_into(&lookup, "RETRY_MAX", &mut config.retry_max);
        parse_into(&lookup, "PROXY_RETRY_BASE_MS", &mut config.retry_base_ms);
        parse_into(&lookup, "PROXY_RETRY_MAX_MS", &mut config.retry_max_ms);
        parse_bool_into(&lookup, "PROXY_FAILOVER_ON_429", &mut config.failover_on_429);
        parse_into(&lookup, "PROVIDER_STRATEGY", &mut config.strategy);
        parse_into(&lookup, "AUTO_SUPPRESS_FAILS", &mut config.auto_suppress_fails);
        parse_into(&lookup, "AUTO_SUPPRESS_TTL_MS", &mut config.auto_suppress_ttl_ms);
        parse_bool_into(&lookup, "AUTO_SUPPRESS_UNHEALTHY", &mut config.auto_suppress_unhealthy);
        parse_into(&lookup, "ROUTING_MODE", &mut config.routing_mode);
        parse_into(&lookup, "USER_RATE_LIMIT_MAX", &mut config.user_rate_limit_max);
        parse_into(&lookup, "USER_RATE_LIMIT_WINDOW_MS", &mut config.user_rate_limit_window_ms);
        parse_into(&lookup, "PROXY_DEFAULT_TIMEOUT_SECS", &mut config.default_timeout_secs);

        config.health_webhook_url = non_empty(lookup("HEALTH_WEBHOOK_URL"));
        config.usage_webhook_url = non_empty(lookup("USAGE_WEBHOOK_URL"));
        config.admin_key = non_empty(lookup("MODELMUX_ADMIN_KEY"));
        if let Some(model) = non_empty(lookup("PROXY_FALLBACK_MODEL")) {
            config.fallback_model = model;
        }

        if let Some(raw) = lookup("USAGE_WEBHOOK_THRESHOLDS") {
            match parse_thresholds(&raw) {
                Ok(list) => config.usage_webhook_thresholds = list,
                Err(e) => tracing::warn!("USAGE_WEBHOOK_THRESHOLDS ignored: {}", e),
            }
        }

        let providers: Vec<String> = config.model_tiers.keys().cloned().collect();
        for provider in providers {
            let upper = provider.to_ascii_uppercase();
            if let Some(tiers) = config.model_tiers.get_mut(&provider) {
                if let Some(strong) = non_empty(lookup(&format!("MODEL_TIER_{}_STRONG", upper))) {
                    tiers.strong = strong;
                }
                if let Some(fast) = non_empty(lookup(&format!("MODEL_TIER_{}_FAST", upper))) {
                    tiers.fast = fast;
                }
            }
        }

        config.check()?;
        Ok(config)
    }

    /// Field and cross-field validation as a [`ConfigError`].
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::ValidationFailed { message: e.to_string() })
    }

    /// Resolve the model a heuristic tier maps to for a provider base name.
    pub fn tier_model(&self, provider_base: &str, tier: ModelTier) -> Option<String> {
        self.model_tiers.get(provider_base).map(|t| match tier {
            ModelTier::Strong => t.strong.clone(),
            ModelTier::Fast => t.fast.clone(),
        })
    }

    pub fn get_bind_address(&self) -> String {
        if self.allow_lan_access {
            "0.0.0.0".to_string()
        } else {
            "127.0.0.1".to_string()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = non_empty(lookup(key)) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *slot = value,
        Err(e) => tracing::warn!("{}={:?} is invalid ({}), keeping default", key, raw, e),
    }
}

fn parse_bool_into<F>(lookup: &F, key: &str, slot: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup(key)) else {
        return;
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => *slot = true,
        "0" | "false" | "no" | "off" => *slot = false,
        _ => tracing::warn!("{}={:?} is not a boolean, keeping default", key, raw),
    }
}

fn parse_thresholds(raw: &str) -> Result<Vec<u32>, String> {
    let mut list = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('%').parse::<u32>().map_err(|e| format!("{}: {}", s, e)))
        .collect::<Result<Vec<_>, _>>()?;
    list.sort_unstable();
    list.dedup();
    Ok(list)
}
