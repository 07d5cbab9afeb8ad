//! Error types for modelmux core infrastructure.

use thiserror::Error;

/// Failures while wiring the gateway together.
///
/// Client-visible request failures are [`modelmux_types::ProxyError`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// Network request failed (HTTP client).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] modelmux_types::ConfigError),
}

/// Result type alias for modelmux core operations.
pub type AppResult<T> = Result<T, AppError>;
