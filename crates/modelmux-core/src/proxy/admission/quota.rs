use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use modelmux_types::models::NotifiedWatermarks;
use modelmux_types::protocol::ChatMessage;
use modelmux_types::{Billing, QuotaLimits, UsageTotals, User};

use crate::proxy::collaborators::UsageStore;
use crate::proxy::webhook::WebhookTarget;

/// First violated dimension, checked in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaViolation {
    Requests,
    PromptTokens,
    CompletionTokens,
}

impl QuotaViolation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requests => "quota_requests",
            Self::PromptTokens => "quota_prompt_tokens",
            Self::CompletionTokens => "quota_completion_tokens",
        }
    }
}

impl std::fmt::Display for QuotaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-flight usage estimate for one attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaEstimate {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Actual usage of a finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Rough prompt size: one token per four characters of message text.
pub fn estimate_prompt_tokens(messages: &[ChatMessage]) -> u64 {
    let chars: usize = messages.iter().map(|m| m.text().chars().count()).sum();
    chars.div_ceil(4) as u64
}

fn exceeds(limit: u64, projected: u64) -> bool {
    limit > 0 && projected > limit
}

/// Which dimension, if any, the projected totals violate.
pub(crate) fn evaluate(
    limits: &QuotaLimits,
    totals: &UsageTotals,
    estimate: QuotaEstimate,
) -> Result<(), QuotaViolation> {
    if exceeds(limits.max_requests, totals.total_requests + 1) {
        return Err(QuotaViolation::Requests);
    }
    if exceeds(limits.max_prompt_tokens, totals.total_prompt_tokens + estimate.prompt_tokens) {
        return Err(QuotaViolation::PromptTokens);
    }
    if exceeds(
        limits.max_completion_tokens,
        totals.total_completion_tokens + estimate.completion_tokens,
    ) {
        return Err(QuotaViolation::CompletionTokens);
    }
    Ok(())
}

/// Highest configured threshold reached by `used / limit`, in percent.
fn reached_threshold(thresholds: &[u32], used: u64, limit: u64) -> u32 {
    if limit == 0 {
        return 0;
    }
    let pct = used.saturating_mul(100) / limit;
    thresholds.iter().copied().filter(|t| u64::from(*t) <= pct).max().unwrap_or(0)
}

/// Usage threshold crossing to announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThresholdCrossing {
    pub dimension: &'static str,
    pub threshold: u32,
    pub used: u64,
    pub limit: u64,
}

/// Move watermarks to the currently reached thresholds.
///
/// Returns the dimensions whose watermark rose. A watermark also drops when
/// usage falls back below it so the next crossing is announced again.
pub(crate) fn advance_watermarks(
    thresholds: &[u32],
    limits: &QuotaLimits,
    totals: &UsageTotals,
    marks: &mut NotifiedWatermarks,
) -> Vec<ThresholdCrossing> {
    let dims: [(&'static str, u64, u64, &mut u32); 3] = [
        ("requests", totals.total_requests, limits.max_requests, &mut marks.requests),
        (
            "prompt_tokens",
            totals.total_prompt_tokens,
            limits.max_prompt_tokens,
            &mut marks.prompt_tokens,
        ),
        (
            "completion_tokens",
            totals.total_completion_tokens,
            limits.max_completion_tokens,
            &mut marks.completion_tokens,
        ),
    ];

    let mut crossings = Vec::new();
    for (dimension, used, limit, mark) in dims {
        let reached = reached_threshold(thresholds, used, limit);
        if reached > *mark {
            crossings.push(ThresholdCrossing { dimension, threshold: reached, used, limit });
        }
        *mark = reached;
    }
    crossings
}

/// Quota checks plus serialized usage persistence.
pub struct QuotaManager {
    store: Arc<dyn UsageStore>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    thresholds: Vec<u32>,
    webhook: Option<WebhookTarget>,
}

impl std::fmt::Debug for QuotaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaManager")
            .field("thresholds", &self.thresholds)
            .field("locked_users", &self.user_locks.len())
            .finish_non_exhaustive()
    }
}

impl QuotaManager {
    pub fn new(store: Arc<dyn UsageStore>, thresholds: Vec<u32>) -> Self {
        Self { store, user_locks: DashMap::new(), thresholds, webhook: None }
    }

    pub fn with_webhook(mut self, webhook: Option<WebhookTarget>) -> Self {
        self.webhook = webhook;
        self
    }

    async fn current_billing(&self, user: &User) -> Billing {
        self.store.load_billing(&user.id).await.unwrap_or_else(|| user.billing.clone())
    }

    /// Project persisted totals plus `estimate` against the user's limits.
    pub async fn check_quota(&self, user: &User, estimate: QuotaEstimate) -> Result<(), QuotaViolation> {
        let billing = self.current_billing(user).await;
        evaluate(&billing.limits, &billing.totals, estimate)
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Persist actual usage (`requests + 1`, real token counts).
    ///
    /// Updates for the same user are serialized.
    pub async fn record_usage(&self, user: &User, report: &UsageReport) {
        let lock = self.user_lock(&user.id);
        let _guard = lock.lock().await;

        let mut billing = self.current_billing(user).await;
        billing.totals.total_requests += 1;
        billing.totals.total_prompt_tokens += report.prompt_tokens;
        billing.totals.total_completion_tokens += report.completion_tokens;

        let crossings = advance_watermarks(
            &self.thresholds,
            &billing.limits,
            &billing.totals,
            &mut billing.last_notified,
        );
        self.store.save_billing(&user.id, &billing).await;

        debug!(
            user_id = %user.id,
            provider = %report.provider,
            model = %report.model,
            prompt_tokens = report.prompt_tokens,
            completion_tokens = report.completion_tokens,
            total_requests = billing.totals.total_requests,
            "Usage recorded"
        );

        for crossing in crossings {
            self.announce(user, &crossing);
        }
    }

    fn announce(&self, user: &User, crossing: &ThresholdCrossing) {
        info!(
            user_id = %user.id,
            dimension = crossing.dimension,
            threshold = crossing.threshold,
            used = crossing.used,
            limit = crossing.limit,
            "Usage threshold crossed"
        );
        if let Some(hook) = &self.webhook {
            hook.send(json!({
                "event": "usage_threshold",
                "user_id": user.id,
                "dimension": crossing.dimension,
                "threshold": crossing.threshold,
                "used": crossing.used,
                "limit": crossing.limit,
            }));
        }
    }
}
