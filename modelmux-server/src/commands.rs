use anyhow::Result;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use modelmux_core::proxy::intent::IntentSignals;
use modelmux_core::proxy::routing::eligible_providers;
use modelmux_core::proxy::{HealthConfig, HealthTracker, RouteRequest, RoutingEngine, StrategySelector};
use modelmux_types::protocol::{ChatMessage, MessageContent};
use modelmux_types::{GatewayConfig, RouteDecision, User};

use crate::gateway_file::GatewayFile;

pub fn check_config(config: &GatewayConfig, path: &Path, json: bool) -> Result<()> {
    let file = GatewayFile::load(path).map_err(|e| anyhow::anyhow!(e))?;

    if json {
        let summary = json!({
            "config_file": path.display().to_string(),
            "gateway": config,
            "providers": file.providers.iter().map(|p| json!({
                "name": p.name,
                "base_url": p.base_url,
                "has_api_key": p.api_key.is_some(),
                "default_model": p.default_model,
            })).collect::<Vec<_>>(),
            "users": file.users.iter().map(|u| &u.id).collect::<Vec<_>>(),
            "routing": file.routing,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Gateway file: {}", path.display());
    println!("  Strategy: {:?}", config.strategy);
    println!("  Routing mode: {:?}", file.routing.mode.unwrap_or(config.routing_mode));
    println!("  Retry: max {} base {}ms cap {}ms", config.retry_max, config.retry_base_ms, config.retry_max_ms);
    println!("  Failover on 429: {}", config.failover_on_429);
    println!("  Admin key: {}", if config.admin_key.is_some() { "set" } else { "not set" });
    println!("Providers ({}):", file.providers.len());
    for p in &file.providers {
        let key = if p.api_key.is_some() { "" } else { " (no api key)" };
        println!("  {} -> {}{}", p.name, p.base_url, key);
    }
    println!("Users: {}", file.users.len());
    println!("Routing rules: {}", file.routing.rules.len());
    Ok(())
}

/// Routing dry run: what would the engine pick, with every provider healthy.
pub fn dry_run(
    config: GatewayConfig,
    file: &GatewayFile,
    model: &str,
    text: &str,
    user_id: Option<&str>,
    hint: Option<&str>,
) -> Result<RouteDecision> {
    let user = match user_id {
        Some(id) => file.user(id).cloned().ok_or_else(|| anyhow::anyhow!("Unknown user: {}", id))?,
        None => User { id: "dry-run".to_string(), ..Default::default() },
    };

    let config = Arc::new(config);
    let selector = Arc::new(StrategySelector::new(config.strategy));
    let engine = RoutingEngine::new(config.clone(), selector);
    let health = HealthTracker::new(HealthConfig::from(config.as_ref()));

    let providers: Vec<_> = file
        .providers
        .iter()
        .filter(|p| user.provider_filter().map_or(true, |allowed| allowed.contains(&p.name)))
        .cloned()
        .collect();
    let eligible = eligible_providers(providers, &health);

    let messages = [ChatMessage { role: "user".to_string(), content: Some(MessageContent::Text(text.to_string())) }];
    let signals = IntentSignals::from_messages(&messages);
    Ok(engine.route(
        &RouteRequest {
            user: &user,
            requested_model: model,
            signals: &signals,
            hint,
            rules: &file.routing.rules,
            mode: engine.effective_mode(&file.routing),
        },
        &eligible,
    ))
}

pub fn print_routes(decision: &RouteDecision) {
    println!("Intent: {}", decision.intent);
    println!("Reason: {}", decision.reason);
    if decision.candidates.is_empty() {
        println!("No candidates");
        return;
    }
    for (i, c) in decision.candidates.iter().enumerate() {
        println!("  {}. {} model={} ({})", i + 1, c.provider, c.model.as_deref().unwrap_or("-"), c.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmux_types::{Provider, RoutingMode, RoutingSettings};

    fn provider(name: &str) -> Provider {
        Provider {
            name: name.to_string(),
            base_url: format!("https://{}.example.com/v1", name),
            api_key: Some("k".to_string()),
            default_model: None,
            timeout_secs: None,
        }
    }

    fn file() -> GatewayFile {
        GatewayFile {
            providers: vec![provider("openai"), provider("groq")],
            users: vec![User {
                id: "bob".into(),
                allowed_providers: vec!["groq".into()],
                ..Default::default()
            }],
            routing: RoutingSettings::default(),
        }
    }

    #[test]
    fn test_dry_run_code_prefers_strong_openai() {
        let decision =
            dry_run(GatewayConfig::default(), &file(), "auto", "```rust\nfn main() {}\n```", None, None).unwrap();
        assert_eq!(decision.intent, "code");
        assert_eq!(decision.candidates[0].provider, "openai");
        assert_eq!(decision.candidates[0].model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_dry_run_respects_allowed_providers() {
        let decision = dry_run(GatewayConfig::default(), &file(), "auto", "hello", Some("bob"), None).unwrap();
        assert!(decision.candidates.iter().all(|c| c.provider == "groq"));
    }

    #[test]
    fn test_dry_run_unknown_user() {
        assert!(dry_run(GatewayConfig::default(), &file(), "auto", "hello", Some("nobody"), None).is_err());
    }

    #[test]
    fn test_dry_run_routing_off_uses_strategy() {
        let mut f = file();
        f.routing.mode = Some(RoutingMode::Off);
        let decision = dry_run(GatewayConfig::default(), &f, "auto", "translate to French", None, None).unwrap();
        assert_eq!(decision.candidates.len(), 1);
        assert_eq!(decision.candidates[0].reason, "fallback-strategy");
    }
}
