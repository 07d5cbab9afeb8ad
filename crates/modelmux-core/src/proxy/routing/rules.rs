//! Custom routing rules: lenient loading and matching.

use serde_json::Value;
use tracing::warn;

use modelmux_types::RoutingRule;

use crate::proxy::intent::normalize_hint;

/// Parse raw rule objects, skipping malformed entries with a warning.
pub fn parse_rules_lenient(raw: &[Value]) -> Vec<RoutingRule> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<RoutingRule>(value.clone()) {
            Ok(rule) if rule.provider.trim().is_empty() => {
                warn!(index, "Skipping routing rule without provider");
                None
            },
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed routing rule");
                None
            },
        })
        .collect()
}

/// Normalized intent a rule is restricted to, `None` when unrestricted.
pub fn rule_intent(rule: &RoutingRule) -> Option<String> {
    rule.intent.as_deref().and_then(normalize_hint)
}

/// Whether `rule` fires for `intent` and the lowercased user text.
pub fn rule_fires(rule: &RoutingRule, intent: &str, lowered_text: &str) -> bool {
    let intent_ok = rule_intent(rule).map_or(true, |wanted| wanted == intent);
    let match_ok = rule
        .match_text
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map_or(true, |needle| lowered_text.contains(&needle.to_lowercase()));
    intent_ok && match_ok
}
