//! Upstream provider definitions.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A registered OpenAI-compatible upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct Provider {
    /// Unique provider name (e.g. `openai`, `groq-eu`)
    #[validate(length(min = 1_u64))]
    pub name: String,
    /// Base URL, `/chat/completions` is appended
    #[validate(url)]
    pub base_url: String,
    /// Bearer token; `None` means registered but unusable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model used when routing picks this provider without a model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Upstream call timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Per-request view of a provider handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl From<&Provider> for ProviderConfig {
    fn from(p: &Provider) -> Self {
        Self {
            api_key: p.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: p.base_url.trim_end_matches('/').to_string(),
            default_model: p.default_model.clone(),
            timeout_secs: p.timeout_secs,
        }
    }
}

impl ProviderConfig {
    /// Full chat-completions endpoint for this provider.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}
