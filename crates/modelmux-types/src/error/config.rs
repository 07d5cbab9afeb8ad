//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {message}")]
    ReadFailed { path: String, message: String },

    /// Config file is not valid JSON for the expected shape
    #[error("Failed to parse config file {path}: {message}")]
    ParseFailed { path: String, message: String },

    /// A single setting has an invalid value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Struct-level validation failed
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}
