//! Provider health records and suppression entries.

use serde::{Deserialize, Serialize};

/// Rolling health statistics for one provider (process lifetime).
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct HealthRecord {
    pub last_success_at: Option<i64>,
    pub last_error_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_latency_ms: Option<u64>,
    /// EWMA of latency samples
    pub rolling_latency_ms: Option<f64>,
    pub success_count: u64,
    pub failure_count: u64,
    pub failure_streak: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Manual,
    Auto,
}

impl std::fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuppressionReason::Manual => write!(f, "manual"),
            SuppressionReason::Auto => write!(f, "auto"),
        }
    }
}

/// Suppression of one provider. `until = None` never expires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuppressionEntry {
    pub reason: SuppressionReason,
    /// Unix milliseconds
    pub until: Option<i64>,
}

impl SuppressionEntry {
    pub fn is_active_at(&self, now_ms: i64) -> bool {
        self.until.map_or(true, |until| until > now_ms)
    }
}

/// Query-surface row: health plus pruned suppression status.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderHealthView {
    pub provider: String,
    #[serde(flatten)]
    pub record: HealthRecord,
    pub suppressed: bool,
    pub suppression: Option<SuppressionEntry>,
}
