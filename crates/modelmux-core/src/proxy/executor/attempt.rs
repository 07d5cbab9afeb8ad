//! Attempt outcomes, attempt records and audit entries.

use serde::Serialize;
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;

use modelmux_types::ProxyError;

use crate::proxy::admission::QuotaViolation;
use crate::proxy::retry::is_retryable_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Reset,
    Aborted,
    Other,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Reset => "reset",
            Self::Aborted => "aborted",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Why admission control rejected an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionReason {
    Quota(QuotaViolation),
    RateLimit { retry_after_ms: u64 },
    ModelNotAllowed { model: String },
}

impl AdmissionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Quota(v) => v.as_str(),
            Self::RateLimit { .. } => "rate_limit",
            Self::ModelNotAllowed { .. } => "model_not_allowed",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Quota(_) | Self::RateLimit { .. } => 429,
            Self::ModelNotAllowed { .. } => 403,
        }
    }
}

/// Outcome of one failed attempt against one provider.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("provider has no API key configured")]
    MissingApiKey,

    #[error("provider is not registered or not allowed")]
    NotConfigured,

    #[error("admission rejected: {}", .reason.code())]
    Admission { reason: AdmissionReason },

    #[error("upstream returned HTTP {status}")]
    Upstream { status: u16, body: String, retry_after: Option<Duration> },

    #[error("network error ({kind}): {message}")]
    Network { kind: NetworkErrorKind, message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("request cancelled by client")]
    Cancelled,
}

impl AttemptError {
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            NetworkErrorKind::Timeout
        } else if e.is_connect() {
            NetworkErrorKind::Connect
        } else if let Some(io_kind) = io_error_kind(e) {
            match io_kind {
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
                    NetworkErrorKind::Reset
                },
                std::io::ErrorKind::ConnectionAborted | std::io::ErrorKind::UnexpectedEof => {
                    NetworkErrorKind::Aborted
                },
                std::io::ErrorKind::TimedOut => NetworkErrorKind::Timeout,
                _ => NetworkErrorKind::Other,
            }
        } else if e.is_request() {
            NetworkErrorKind::Reset
        } else {
            NetworkErrorKind::Other
        };
        Self::Network { kind, message: e.to_string() }
    }

    /// Whether the same provider may be tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => is_retryable_status(*status),
            Self::Network { kind, .. } => !matches!(kind, NetworkErrorKind::Other),
            _ => false,
        }
    }

    /// Status recorded for this attempt, if it has one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Admission { reason } => Some(reason.status()),
            Self::Network { .. } => Some(503),
            _ => None,
        }
    }

    /// Whether this failure should count against provider health.
    pub fn counts_against_health(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Network { .. } => true,
            _ => false,
        }
    }

    pub fn into_proxy_error(self, provider: &str) -> ProxyError {
        match self {
            Self::MissingApiKey | Self::NotConfigured => {
                ProxyError::ProviderNotConfigured { provider: provider.to_string() }
            },
            Self::Admission { reason } => match reason {
                AdmissionReason::Quota(v) => ProxyError::QuotaExceeded { reason: v.as_str().to_string() },
                AdmissionReason::RateLimit { retry_after_ms } => {
                    ProxyError::RateLimited { provider: provider.to_string(), retry_after_ms }
                },
                AdmissionReason::ModelNotAllowed { model } => {
                    ProxyError::ModelNotAllowed { provider: provider.to_string(), model }
                },
            },
            Self::Upstream { status, body, .. } => {
                ProxyError::Upstream { provider: provider.to_string(), status, body }
            },
            Self::Network { message, .. } => ProxyError::ProviderUnavailable { message },
            Self::Internal { message } => ProxyError::Internal { message },
            Self::Cancelled => ProxyError::Internal { message: "request cancelled by client".to_string() },
        }
    }
}

fn io_error_kind(e: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = err.source();
    }
    None
}

/// One try against one provider.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttemptRecord {
    pub provider: String,
    pub model: Option<String>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl AttemptRecord {
    pub fn failed(provider: &str, model: Option<&str>, attempt: u32, err: &AttemptError, latency_ms: u64) -> Self {
        let error = match err {
            AttemptError::Admission { reason } => reason.code().to_string(),
            other => other.to_string(),
        };
        Self {
            provider: provider.to_string(),
            model: model.map(str::to_string),
            attempt,
            status: err.status(),
            error: Some(error),
            latency_ms,
        }
    }

    pub fn succeeded(provider: &str, model: &str, attempt: u32, status: u16, latency_ms: u64) -> Self {
        Self {
            provider: provider.to_string(),
            model: Some(model.to_string()),
            attempt,
            status: Some(status),
            error: None,
            latency_ms,
        }
    }
}

/// Per-request audit entry handed to the audit sink.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub trace_id: String,
    pub user_id: String,
    pub requested_model: String,
    pub intent: String,
    pub route_reason: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub status: u16,
    pub streamed: bool,
    pub attempts: Vec<AttemptRecord>,
    pub duration_ms: u64,
    pub timestamp: i64,
}
