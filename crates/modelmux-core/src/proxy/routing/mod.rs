//! Routing rule engine.
//!
//! Turns a request into an ordered, provider-deduplicated candidate list:
//! explicit-model short-circuit, custom rules, built-in intent heuristics,
//! and the strategy selector as last resort.

pub mod heuristics;
pub mod rules;


use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use modelmux_types::models::routing::is_auto_model;
use modelmux_types::{
    Candidate, GatewayConfig, Provider, RouteDecision, RoutingMode, RoutingRule, RoutingSettings,
    User,
};

use crate::proxy::health::HealthTracker;
use crate::proxy::intent::{classify, IntentSignals};
use crate::proxy::strategy::StrategySelector;

use heuristics::{heuristic_pairs, HeuristicModel};
use rules::{rule_fires, rule_intent};

pub const REASON_EXPLICIT: &str = "explicit-model";
pub const REASON_NO_PROVIDER_FOR_EXPLICIT: &str = "no_provider_for_explicit";
pub const REASON_FALLBACK_STRATEGY: &str = "fallback-strategy";
pub const REASON_FALLBACK: &str = "fallback";

/// Everything the engine needs to know about one request.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub user: &'a User,
    pub requested_model: &'a str,
    pub signals: &'a IntentSignals,
    pub hint: Option<&'a str>,
    pub rules: &'a [RoutingRule],
    pub mode: RoutingMode,
}

/// Registered providers minus the ones currently suppressed.
pub fn eligible_providers(providers: Vec<Provider>, health: &HealthTracker) -> Vec<Provider> {
    providers.into_iter().filter(|p| !health.is_suppressed(&p.name)).collect()
}

/// Provider a rule or heuristic base name resolves to.
///
/// A locked provider replaces the lookup: it is used only when it belongs to
/// `base` (equal, or `base` is its prefix like `openai` -> `openai-eu`).
fn resolve_base<'p>(base: &str, eligible: &'p [Provider], locked: Option<&str>) -> Option<&'p Provider> {
    let base = base.trim();
    if base.is_empty() {
        return None;
    }
    if let Some(locked) = locked {
        if locked == base || locked.starts_with(base) {
            return eligible.iter().find(|p| p.name == locked);
        }
        return None;
    }
    eligible
        .iter()
        .find(|p| p.name == base)
        .or_else(|| eligible.iter().find(|p| p.name.starts_with(base)))
}

/// Keep the first candidate per provider.
fn dedup_by_provider(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates.into_iter().filter(|c| seen.insert(c.provider.clone())).collect()
}

fn decision(candidates: Vec<Candidate>, intent: String) -> RouteDecision {
    let candidates = dedup_by_provider(candidates);
    let reason = candidates.first().map_or_else(|| REASON_FALLBACK.to_string(), |c| c.reason.clone());
    RouteDecision { candidates, intent, reason }
}

#[derive(Debug, Clone)]
pub struct RoutingEngine {
    config: Arc<GatewayConfig>,
    selector: Arc<StrategySelector>,
}

impl RoutingEngine {
    pub fn new(config: Arc<GatewayConfig>, selector: Arc<StrategySelector>) -> Self {
        Self { config, selector }
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    /// Persisted mode wins over the configured default.
    pub fn effective_mode(&self, settings: &RoutingSettings) -> RoutingMode {
        settings.mode.unwrap_or(self.config.routing_mode)
    }

    /// Build the candidate list for one request from `eligible` providers.
    pub fn route(&self, req: &RouteRequest<'_>, eligible: &[Provider]) -> RouteDecision {
        let intent = classify(req.signals, req.hint);

        if !is_auto_model(req.requested_model) {
            let model = req.requested_model.trim();
            let candidates = self
                .selector
                .select_provider(eligible, req.user, model)
                .map(|p| Candidate::new(p, Some(model.to_string()), REASON_EXPLICIT))
                .into_iter()
                .collect::<Vec<_>>();
            let mut decision = decision(candidates, intent);
            if decision.candidates.is_empty() {
                decision.reason = REASON_NO_PROVIDER_FOR_EXPLICIT.to_string();
            }
            return decision;
        }

        let mut candidates = Vec::new();
        if req.mode == RoutingMode::Auto {
            let locked = req.user.locked_provider.as_deref();
            self.apply_rules(req, &intent, eligible, locked, &mut candidates);
            self.apply_heuristics(&intent, eligible, locked, &mut candidates);
        }

        if candidates.is_empty() {
            if let Some(provider) = self.selector.select_provider(eligible, req.user, req.requested_model) {
                let model = eligible.iter().find(|p| p.name == provider).and_then(|p| p.default_model.clone());
                candidates.push(Candidate::new(provider, model, REASON_FALLBACK_STRATEGY));
            }
        }

        let decision = decision(candidates, intent);
        debug!(
            intent = %decision.intent,
            reason = %decision.reason,
            candidates = decision.candidates.len(),
            "Route computed"
        );
        decision
    }

    fn apply_rules(
        &self,
        req: &RouteRequest<'_>,
        intent: &str,
        eligible: &[Provider],
        locked: Option<&str>,
        out: &mut Vec<Candidate>,
    ) {
        let lowered = req.signals.text.to_lowercase();
        for rule in req.rules.iter().filter(|r| rule_fires(r, intent, &lowered)) {
            let Some(provider) = resolve_base(&rule.provider, eligible, locked) else {
                debug!(provider = %rule.provider, "Rule target not eligible");
                continue;
            };
            let model = rule.model.clone().filter(|m| !m.trim().is_empty()).or_else(|| provider.default_model.clone());
            let reason = match rule_intent(rule) {
                Some(ri) => format!("rule:custom:{}", ri),
                None => "rule:custom".to_string(),
            };
            out.push(Candidate::new(provider.name.clone(), model, reason));
        }
    }

    fn apply_heuristics(
        &self,
        intent: &str,
        eligible: &[Provider],
        locked: Option<&str>,
        out: &mut Vec<Candidate>,
    ) {
        for pair in heuristic_pairs(intent) {
            let Some(provider) = resolve_base(pair.base, eligible, locked) else {
                continue;
            };
            let model = match pair.model {
                HeuristicModel::Tier(tier) => self.config.tier_model(pair.base, tier),
                HeuristicModel::Fixed(model) => Some(model.to_string()),
            }
            .or_else(|| provider.default_model.clone());
            out.push(Candidate::new(
                provider.name.clone(),
                model,
                format!("rule:{}->{}", intent, pair.base),
            ));
        }
    }
}
