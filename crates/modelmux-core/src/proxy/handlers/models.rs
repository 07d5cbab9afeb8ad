// OpenAI models listing
use axum::{extract::State, Extension, Json};
use std::collections::HashSet;

use modelmux_types::protocol::{ModelEntry, ModelList};
use modelmux_types::models::AUTO_MODEL_TOKENS;

use crate::proxy::middleware::AuthenticatedUser;
use crate::proxy::server::AppState;

const OWNER: &str = "modelmux";

pub async fn handle_list_models(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<ModelList> {
    let providers = state.collaborators.registry.get_all_providers(auth.user.provider_filter()).await;

    let mut seen = HashSet::new();
    let mut data: Vec<ModelEntry> = AUTO_MODEL_TOKENS
        .iter()
        .filter(|id| seen.insert((*id).to_string()))
        .map(|id| ModelEntry::new(*id, OWNER))
        .collect();

    for provider in &providers {
        if let Some(model) = provider.default_model.as_deref().filter(|m| !m.trim().is_empty()) {
            if seen.insert(model.to_string()) {
                data.push(ModelEntry::new(model, provider.name.clone()));
            }
        }
    }

    Json(ModelList::new(data))
}
