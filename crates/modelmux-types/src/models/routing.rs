//! Routing rules and routing decisions.

use serde::{Deserialize, Serialize};

use super::config::RoutingMode;

/// Model names that ask the gateway to choose provider and model itself.
pub const AUTO_MODEL_TOKENS: &[&str] = &["auto", "modelmux-auto", "router/auto"];

/// Whether `model` is one of the reserved auto-tokens (case-insensitive).
pub fn is_auto_model(model: &str) -> bool {
    let normalized = model.trim().to_ascii_lowercase();
    normalized.is_empty() || AUTO_MODEL_TOKENS.contains(&normalized.as_str())
}

/// User-defined routing rule.
///
/// Fires when both optional predicates hold; emits one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Case-insensitive substring of the user text
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_text: Option<String>,
    #[serde(alias = "providerName")]
    pub provider: String,
    #[serde(alias = "modelName", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Persisted routing settings as returned by the settings collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingSettings {
    /// Overrides `ROUTING_MODE` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RoutingMode>,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

/// One entry of the ordered candidate list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Candidate {
    pub provider: String,
    /// Model override for this provider; `None` lets the executor decide
    pub model: Option<String>,
    pub reason: String,
}

impl Candidate {
    pub fn new(provider: impl Into<String>, model: Option<String>, reason: impl Into<String>) -> Self {
        Self { provider: provider.into(), model, reason: reason.into() }
    }
}

/// Output of the routing engine for one request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteDecision {
    pub candidates: Vec<Candidate>,
    pub intent: String,
    /// Reason of the top candidate, `"fallback"` when there is none
    pub reason: String,
}
