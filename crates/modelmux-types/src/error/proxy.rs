//! Proxy-related errors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors that can reach the client of the gateway.
///
/// Every variant renders to the shared envelope
/// `{"error": {"message", "type", "code"?}}` via [`ProxyError::to_envelope`].
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum ProxyError {
    /// Upstream provider answered with a non-success status
    #[error("Upstream {provider} returned HTTP {status}")]
    Upstream { provider: String, status: u16, body: String },

    /// No response from any provider (network failure, all unreachable)
    #[error("Provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// User quota would be exceeded (`quota_requests`, `quota_prompt_tokens`, ...)
    #[error("Quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    /// Per user+provider rate limit window is full
    #[error("Rate limited on {provider}, retry after {retry_after_ms}ms")]
    RateLimited { provider: String, retry_after_ms: u64 },

    /// Model blocked by the user's allow/deny lists
    #[error("Model {model} is not allowed on {provider}")]
    ModelNotAllowed { provider: String, model: String },

    /// Explicit model requested but no eligible provider serves it
    #[error("No provider available for model: {model}")]
    NoProviderForModel { model: String },

    /// Routing produced no candidates at all
    #[error("No provider available for this request")]
    NoCandidates,

    /// Provider is registered but has no API key configured
    #[error("Provider {provider} is not configured")]
    ProviderNotConfigured { provider: String },

    /// Request validation failed
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Caller could not be authenticated
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Internal proxy error (bugs, unexpected states)
    #[error("Internal proxy error: {message}")]
    Internal { message: String },
}

impl ProxyError {
    /// Get HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::ProviderUnavailable { .. } | Self::NoCandidates => 503,
            Self::QuotaExceeded { .. } | Self::RateLimited { .. } => 429,
            Self::ModelNotAllowed { .. } => 403,
            Self::NoProviderForModel { .. } | Self::InvalidRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::ProviderNotConfigured { .. } | Self::Internal { .. } => 500,
        }
    }

    /// OpenAI-style `error.type` string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "upstream_error",
            Self::ProviderUnavailable { .. } | Self::NoCandidates => "provider_unavailable",
            Self::QuotaExceeded { .. } => "insufficient_quota",
            Self::RateLimited { .. } => "rate_limit_error",
            Self::ModelNotAllowed { .. } => "permission_error",
            Self::NoProviderForModel { .. } | Self::InvalidRequest { .. } => {
                "invalid_request_error"
            },
            Self::Unauthorized { .. } => "authentication_error",
            Self::ProviderNotConfigured { .. } | Self::Internal { .. } => "internal_error",
        }
    }

    /// Machine-readable `error.code`, when one exists.
    pub fn error_code(&self) -> Option<String> {
        match self {
            Self::Upstream { .. } | Self::InvalidRequest { .. } | Self::Internal { .. } => None,
            Self::ProviderUnavailable { .. } => Some("provider_unavailable".to_string()),
            Self::NoCandidates => Some("no_provider_available".to_string()),
            Self::QuotaExceeded { reason } => Some(reason.clone()),
            Self::RateLimited { .. } => Some("rate_limit".to_string()),
            Self::ModelNotAllowed { .. } => Some("model_not_allowed".to_string()),
            Self::NoProviderForModel { .. } => Some("no_provider_for_explicit".to_string()),
            Self::ProviderNotConfigured { .. } => Some("provider_not_configured".to_string()),
            Self::Unauthorized { .. } => Some("invalid_api_key".to_string()),
        }
    }

    /// Render the `{error:{message,type,code?}}` envelope.
    ///
    /// Upstream errors whose body already carries an `error` object are passed
    /// through unchanged so clients see the provider's own shape.
    pub fn to_envelope(&self) -> Value {
        if let Self::Upstream { body, status, .. } = self {
            if let Ok(parsed) = serde_json::from_str::<Value>(body) {
                if parsed.get("error").is_some_and(Value::is_object) {
                    return parsed;
                }
            }
            let message = if body.trim().is_empty() {
                format!("Upstream error (HTTP {})", status)
            } else {
                body.clone()
            };
            return json!({ "error": { "message": message, "type": self.error_type() } });
        }

        let mut error = json!({
            "message": self.to_string(),
            "type": self.error_type(),
        });
        if let Some(code) = self.error_code() {
            error["code"] = Value::String(code);
        }
        json!({ "error": error })
    }
}
