//! Gateway data file: providers, users and persisted routing settings.
//!
//! ```json
//! {
//!   "providers": [{"name": "openai", "base_url": "https://api.openai.com/v1", "api_key": "sk-..."}],
//!   "users": [{"id": "alice", "api_keys": ["tok-alice"]}],
//!   "routing": {"mode": "auto", "rules": [{"intent": "code", "provider": "openai"}]}
//! }
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use modelmux_core::proxy::routing::rules::parse_rules_lenient;
use modelmux_types::{ConfigError, Provider, RoutingMode, RoutingSettings, User};

#[derive(Debug, Default, Deserialize)]
struct RawGatewayFile {
    #[serde(default)]
    providers: Vec<Provider>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    routing: RawRouting,
}

#[derive(Debug, Default, Deserialize)]
struct RawRouting {
    #[serde(default)]
    mode: Option<RoutingMode>,
    #[serde(default)]
    rules: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct GatewayFile {
    pub providers: Vec<Provider>,
    pub users: Vec<User>,
    pub routing: RoutingSettings,
}

impl GatewayFile {
    /// Read and validate `path`. A missing file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path_display = path.display().to_string();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Gateway file {} not found, starting with no providers or users", path_display);
                return Ok(Self::default());
            },
            Err(e) => return Err(ConfigError::ReadFailed { path: path_display, message: e.to_string() }),
        };

        let file = Self::parse(&raw).map_err(|e| match e {
            ConfigError::ParseFailed { message, .. } => ConfigError::ParseFailed { path: path_display.clone(), message },
            other => other,
        })?;
        info!(
            "Loaded gateway file {}: {} providers, {} users, {} routing rules",
            path_display,
            file.providers.len(),
            file.users.len(),
            file.routing.rules.len()
        );
        Ok(file)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let parsed: RawGatewayFile = serde_json::from_str(raw)
            .map_err(|e| ConfigError::ParseFailed { path: String::new(), message: e.to_string() })?;

        let mut seen = HashSet::new();
        for provider in &parsed.providers {
            validate_provider(provider)?;
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("providers.{}", provider.name),
                    message: "duplicate provider name".to_string(),
                });
            }
        }
        for user in &parsed.users {
            if user.id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "users.id".to_string(),
                    message: "user id must not be empty".to_string(),
                });
            }
        }

        Ok(Self {
            providers: parsed.providers,
            users: parsed.users,
            routing: RoutingSettings {
                mode: parsed.routing.mode,
                rules: parse_rules_lenient(&parsed.routing.rules),
            },
        })
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }
}

fn validate_provider(provider: &Provider) -> Result<(), ConfigError> {
    let key = format!("providers.{}", provider.name);
    if provider.name.trim().is_empty() {
        return Err(ConfigError::InvalidValue { key, message: "provider name must not be empty".to_string() });
    }
    let url = url::Url::parse(&provider.base_url)
        .map_err(|e| ConfigError::InvalidValue { key: key.clone(), message: format!("base_url: {}", e) })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key,
            message: format!("base_url scheme '{}' is not http(s)", url.scheme()),
        });
    }
    Ok(())
}
