use modelmux_types::User;

/// Whether `pattern` covers `model`: exact (case-insensitive), `*`, or `prefix*`.
pub fn model_matches(pattern: &str, model: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let model = model.trim().to_ascii_lowercase();
    match pattern.strip_suffix('*') {
        Some(prefix) => model.starts_with(prefix),
        None => pattern == model,
    }
}

fn matches_any(patterns: &[String], model: &str) -> bool {
    patterns.iter().any(|p| model_matches(p, model))
}

/// Allow/deny evaluation for one attempt.
///
/// Deny lists always win (per-provider, then global). Otherwise a non-empty
/// per-provider allow list restricts, else a non-empty global allow list.
pub fn is_model_allowed(user: &User, provider: &str, model: &str) -> bool {
    let provider_denied = user.provider_denied_models.get(provider).map(Vec::as_slice).unwrap_or(&[]);
    if matches_any(provider_denied, model) || matches_any(&user.denied_models, model) {
        return false;
    }

    if let Some(allowed) = user.provider_allowed_models.get(provider).filter(|l| !l.is_empty()) {
        return matches_any(allowed, model);
    }
    if !user.allowed_models.is_empty() {
        return matches_any(&user.allowed_models, model);
    }
    true
}
