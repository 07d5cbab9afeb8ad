//! Typed error definitions for modelmux.
//!
//! This module provides a structured error hierarchy with specific error types
//! for different domains. All errors are designed to be:
//!
//! - **Serializable** for API responses via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for error handling logic via enum variants

mod config;
mod proxy;

pub use config::ConfigError;
pub use proxy::ProxyError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type that wraps all domain-specific errors.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "domain", content = "error")]
pub enum TypedError {
    /// Wraps a proxy operation error
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Wraps a configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Standard Result type using TypedError.
pub type Result<T> = std::result::Result<T, TypedError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = TypedError::Config(ConfigError::InvalidValue {
            key: "RETRY_MAX".to_string(),
            message: "not a number".to_string(),
        });

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Config"));
        assert!(json.contains("RETRY_MAX"));

        let deserialized: TypedError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::RateLimited { provider: "groq".to_string(), retry_after_ms: 1500 };

        let msg = format!("{}", err);
        assert!(msg.contains("groq"));
        assert!(msg.contains("1500"));
    }
}
