//! Fallback provider selection.
//!
//! Used by the routing engine for explicit models and whenever rules and
//! heuristics produce nothing. Owns the process-wide round-robin counter.

use rand::Rng;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use tracing::debug;

use modelmux_types::{Provider, ProviderStrategy, User};

/// Built-in model-name hints, checked in order.
#[allow(clippy::expect_used, reason = "Static regex literals are verified by tests")]
static MODEL_HINTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^(gpt-|o[13]|omni|dall-e|tts|whisper)", "openai"),
        (r"^claude", "anthropic"),
        (r"^(llama|mixtral|qwen|gemma|groq/)|/(llama|mixtral|qwen|gemma)", "groq"),
    ]
    .into_iter()
    .map(|(pattern, provider)| (Regex::new(pattern).expect("model hint regex"), provider))
    .collect()
});

/// Provider family suggested by a model name, if any.
pub fn provider_hint_for_model(model: &str) -> Option<&'static str> {
    let lowered = model.trim().to_ascii_lowercase();
    MODEL_HINTS.iter().find(|(re, _)| re.is_match(&lowered)).map(|(_, provider)| *provider)
}

/// Provider prefix of a model name: `openai/gpt-4o` -> `openai`, `gpt-4o` -> `gpt`.
fn model_prefix(model: &str) -> &str {
    model.split(['/', '-']).next().unwrap_or(model)
}

#[derive(Debug)]
pub struct StrategySelector {
    strategy: ProviderStrategy,
    round_robin: AtomicUsize,
}

impl StrategySelector {
    pub fn new(strategy: ProviderStrategy) -> Self {
        Self { strategy, round_robin: AtomicUsize::new(0) }
    }

    pub fn strategy(&self) -> ProviderStrategy {
        self.strategy
    }

    /// Pick one provider from `eligible` for `requested_model`.
    ///
    /// Precedence: locked provider, `user.model_routing`, model-name hints,
    /// preferred provider, configured strategy. Hinted names are only used
    /// when they are eligible.
    pub fn select_provider(
        &self,
        eligible: &[Provider],
        user: &User,
        requested_model: &str,
    ) -> Option<String> {
        if eligible.is_empty() {
            return None;
        }
        let is_eligible = |name: &str| eligible.iter().any(|p| p.name == name);

        if let Some(locked) = user.locked_provider.as_deref().filter(|l| is_eligible(l)) {
            return Some(locked.to_string());
        }

        if let Some(target) = Self::user_model_route(user, requested_model) {
            if is_eligible(target) {
                debug!(model = %requested_model, provider = %target, "model routed by user mapping");
                return Some(target.to_string());
            }
        }

        if let Some(hint) = provider_hint_for_model(requested_model) {
            if let Some(p) = eligible.iter().find(|p| p.name == hint) {
                return Some(p.name.clone());
            }
        }

        if let Some(preferred) = user.preferred_provider.as_deref().filter(|p| is_eligible(p)) {
            return Some(preferred.to_string());
        }

        let picked = match self.strategy {
            ProviderStrategy::RoundRobin => {
                let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % eligible.len();
                &eligible[idx]
            },
            ProviderStrategy::Cheapest | ProviderStrategy::Fastest => {
                eligible.iter().find(|p| p.name == "groq").unwrap_or(&eligible[0])
            },
            ProviderStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..eligible.len());
                &eligible[idx]
            },
            ProviderStrategy::First => &eligible[0],
        };
        Some(picked.name.clone())
    }

    fn user_model_route<'a>(user: &'a User, requested_model: &str) -> Option<&'a str> {
        let model = requested_model.trim();
        if model.is_empty() {
            return None;
        }
        if let Some(target) = user.model_routing.get(model) {
            return Some(target.as_str());
        }
        let wildcard = format!("{}*", model_prefix(model));
        user.model_routing.get(&wildcard).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn provider(name: &str) -> Provider {
        Provider {
            name: name.to_string(),
            base_url: format!("https://{}.example.com/v1", name),
            api_key: Some("k".to_string()),
            default_model: None,
            timeout_secs: None,
        }
    }

    fn providers(names: &[&str]) -> Vec<Provider> {
        names.iter().map(|n| provider(n)).collect()
    }

    #[test]
    fn test_model_hints() {
        assert_eq!(provider_hint_for_model("gpt-4o-mini"), Some("openai"));
        assert_eq!(provider_hint_for_model("o1-preview"), Some("openai"));
        assert_eq!(provider_hint_for_model("whisper-1"), Some("openai"));
        assert_eq!(provider_hint_for_model("claude-3-5-sonnet"), Some("anthropic"));
        assert_eq!(provider_hint_for_model("llama-3.1-8b-instant"), Some("groq"));
        assert_eq!(provider_hint_for_model("groq/mixtral-8x7b"), Some("groq"));
        assert_eq!(provider_hint_for_model("mistral-large"), None);
    }

    #[test]
    fn test_round_robin_covers_every_provider_once() {
        let selector = StrategySelector::new(ProviderStrategy::RoundRobin);
        let eligible = providers(&["a", "b", "c"]);
        let user = User::default();
        let picked: HashSet<String> = (0..3)
            .filter_map(|_| selector.select_provider(&eligible, &user, "mystery-model"))
            .collect();
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn test_user_mapping_beats_model_hint() {
        let selector = StrategySelector::new(ProviderStrategy::First);
        let eligible = providers(&["openai", "azure"]);
        let user = User {
            model_routing: HashMap::from([("gpt*".to_string(), "azure".to_string())]),
            ..Default::default()
        };
        assert_eq!(selector.select_provider(&eligible, &user, "gpt-4o").as_deref(), Some("azure"));
    }

    #[test]
    fn test_ineligible_hint_falls_through_to_strategy() {
        let selector = StrategySelector::new(ProviderStrategy::Cheapest);
        let eligible = providers(&["openai", "groq"]);
        let user = User::default();
        assert_eq!(
            selector.select_provider(&eligible, &user, "claude-3-opus").as_deref(),
            Some("groq")
        );
    }

    #[test]
    fn test_preferred_provider_used_when_no_hint() {
        let selector = StrategySelector::new(ProviderStrategy::First);
        let eligible = providers(&["openai", "groq"]);
        let user = User { preferred_provider: Some("groq".to_string()), ..Default::default() };
        assert_eq!(selector.select_provider(&eligible, &user, "auto").as_deref(), Some("groq"));
    }

    #[test]
    fn test_empty_eligible_returns_none() {
        let selector = StrategySelector::new(ProviderStrategy::Random);
        assert_eq!(selector.select_provider(&[], &User::default(), "gpt-4o"), None);
    }
}
