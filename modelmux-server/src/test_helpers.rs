//! Test helpers for modelmux-server unit tests.

use modelmux_types::{GatewayConfig, Provider, User};

use crate::gateway_file::GatewayFile;
use crate::state::AppState;

fn sample_file() -> GatewayFile {
    GatewayFile {
        providers: vec![Provider {
            name: "openai".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            api_key: Some("sk-test".to_string()),
            default_model: None,
            timeout_secs: None,
        }],
        users: vec![User { id: "alice".into(), api_keys: vec!["tok-alice".into()], ..Default::default() }],
        ..GatewayFile::default()
    }
}

/// Minimal `AppState` with one provider and one user, no admin key.
pub fn test_app_state() -> AppState {
    AppState::from_gateway_file(GatewayConfig::default(), sample_file()).expect("failed to create test AppState")
}

pub fn test_app_state_with_admin_key(key: &str) -> AppState {
    let config = GatewayConfig { admin_key: Some(key.to_string()), ..GatewayConfig::default() };
    AppState::from_gateway_file(config, sample_file()).expect("failed to create test AppState")
}
