//! Provider health tracking and suppression (circuit breaker).
//!
//! States per provider:
//! - Healthy: candidates are tried normally
//! - AutoSuppressed(until): entered after `fail_threshold` consecutive failures,
//!   pruned lazily once `until` has passed
//! - ManualSuppressed: set and cleared by an operator, never pruned
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  HealthTracker                                            │
//! │  ├── state: Mutex<{records, suppressions}>                │
//! │  ├── config: HealthConfig                                 │
//! │  └── webhook: Option<WebhookTarget>                       │
//! └──────────────────────────────────────────────────────────┘
//! ```

#[cfg(test)]
mod tests;

use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use modelmux_types::models::ProviderHealthView;
use modelmux_types::{GatewayConfig, HealthRecord, SuppressionEntry, SuppressionReason};

use crate::proxy::webhook::WebhookTarget;
use crate::utils::now_ms;

/// Smoothing factor for the rolling latency.
pub const LATENCY_EWMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Consecutive failures before auto-suppression
    pub fail_threshold: u32,
    pub suppress_ttl_ms: u64,
    /// Whether auto-suppression is enabled at all
    pub auto_suppress: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { fail_threshold: 3, suppress_ttl_ms: 600_000, auto_suppress: true }
    }
}

impl From<&GatewayConfig> for HealthConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            fail_threshold: config.auto_suppress_fails.max(1),
            suppress_ttl_ms: config.auto_suppress_ttl_ms,
            auto_suppress: config.auto_suppress_unhealthy,
        }
    }
}

#[derive(Debug, Default)]
struct HealthState {
    records: HashMap<String, HealthRecord>,
    suppressions: HashMap<String, SuppressionEntry>,
}

impl HealthState {
    /// Active suppression for `provider`, dropping it first if expired.
    fn active_suppression(&mut self, provider: &str, now: i64) -> Option<SuppressionEntry> {
        let entry = *self.suppressions.get(provider)?;
        if entry.is_active_at(now) {
            Some(entry)
        } else {
            debug!(provider = %provider, "Suppression expired, pruning");
            self.suppressions.remove(provider);
            None
        }
    }
}

#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    state: Mutex<HealthState>,
    webhook: Option<WebhookTarget>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self { config, state: Mutex::new(HealthState::default()), webhook: None }
    }

    pub fn with_webhook(mut self, webhook: Option<WebhookTarget>) -> Self {
        self.webhook = webhook;
        self
    }

    pub fn config(&self) -> HealthConfig {
        self.config
    }

    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        self.record_success_at(provider, latency_ms, now_ms());
    }

    pub fn record_success_at(&self, provider: &str, latency_ms: u64, now: i64) {
        let mut state = self.state.lock();
        let record = state.records.entry(provider.to_string()).or_default();
        record.success_count += 1;
        record.failure_streak = 0;
        record.last_success_at = Some(now);
        record.last_latency_ms = Some(latency_ms);
        let sample = latency_ms as f64;
        record.rolling_latency_ms = Some(match record.rolling_latency_ms {
            Some(prev) => LATENCY_EWMA_ALPHA * sample + (1.0 - LATENCY_EWMA_ALPHA) * prev,
            None => sample,
        });
    }

    pub fn record_failure(&self, provider: &str, error: &str) -> bool {
        self.record_failure_at(provider, error, now_ms())
    }

    /// Record a failure. Returns `true` when this failure auto-suppressed the provider.
    pub fn record_failure_at(&self, provider: &str, error: &str, now: i64) -> bool {
        let (streak, until) = {
            let mut state = self.state.lock();
            let record = state.records.entry(provider.to_string()).or_default();
            record.failure_count += 1;
            record.failure_streak += 1;
            record.last_error = Some(error.to_string());
            record.last_error_at = Some(now);
            let streak = record.failure_streak;

            if !self.config.auto_suppress || streak < self.config.fail_threshold {
                return false;
            }
            // Manual entries and still-running auto entries are left as they are.
            if state.active_suppression(provider, now).is_some() {
                return false;
            }
            let until = now + self.config.suppress_ttl_ms as i64;
            state.suppressions.insert(
                provider.to_string(),
                SuppressionEntry { reason: SuppressionReason::Auto, until: Some(until) },
            );
            (streak, until)
        };

        self.announce_suppression(provider, streak, until, error);
        true
    }

    fn announce_suppression(&self, provider: &str, streak: u32, until: i64, error: &str) {
        match &self.webhook {
            Some(hook) => {
                info!(provider = %provider, streak, until, "Provider auto-suppressed, notifying webhook");
                hook.send(json!({
                        "event": "provider_suppressed",
                        "provider": provider,
                        "reason": SuppressionReason::Auto,
                        "failure_streak": streak,
                        "until": until,
                        "last_error": error,
                }));
            },
            None => {
                warn!(
                    provider = %provider,
                    streak,
                    until,
                    last_error = %error,
                    "Provider auto-suppressed after consecutive failures"
                );
            },
        }
    }

    pub fn is_suppressed(&self, provider: &str) -> bool {
        self.is_suppressed_at(provider, now_ms())
    }

    pub fn is_suppressed_at(&self, provider: &str, now: i64) -> bool {
        self.state.lock().active_suppression(provider, now).is_some()
    }

    /// Operator suppression. `until = None` persists until cleared.
    pub fn suppress(&self, provider: &str, until: Option<i64>) {
        info!(provider = %provider, until = ?until, "Provider manually suppressed");
        self.state.lock().suppressions.insert(
            provider.to_string(),
            SuppressionEntry { reason: SuppressionReason::Manual, until },
        );
    }

    /// Remove any suppression. Returns whether one existed.
    pub fn clear_suppression(&self, provider: &str) -> bool {
        let removed = self.state.lock().suppressions.remove(provider).is_some();
        if removed {
            info!(provider = %provider, "Provider suppression cleared");
        }
        removed
    }

    pub fn record(&self, provider: &str) -> Option<HealthRecord> {
        self.state.lock().records.get(provider).cloned()
    }

    pub fn snapshot(&self) -> Vec<ProviderHealthView> {
        self.snapshot_at(now_ms())
    }

    /// Every tracked or suppressed provider, sorted by name, with expired
    /// suppressions pruned.
    pub fn snapshot_at(&self, now: i64) -> Vec<ProviderHealthView> {
        let mut state = self.state.lock();
        let names: BTreeSet<String> =
            state.records.keys().chain(state.suppressions.keys()).cloned().collect();
        names
            .into_iter()
            .map(|name| {
                let suppression = state.active_suppression(&name, now);
                ProviderHealthView {
                    record: state.records.get(&name).cloned().unwrap_or_default(),
                    suppressed: suppression.is_some(),
                    suppression,
                    provider: name,
                }
            })
            .collect()
    }
}
