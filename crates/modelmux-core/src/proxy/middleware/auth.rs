use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use modelmux_types::{ProxyError, User};

use crate::proxy::handlers::error_response;
use crate::proxy::server::AppState;

/// Caller resolved by [`auth_middleware`], available as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    /// Token the caller presented
    pub token: String,
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn is_health_check(path: &str) -> bool {
    path == "/healthz" || path == "/api/health" || path == "/health"
}

/// API key from `Authorization: Bearer`, else `x-api-key`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or(Some(s)))
        .or_else(|| headers.get("x-api-key").and_then(|h| h.to_str().ok()))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// Resolve the caller through the user directory.
pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    tracing::info!("Request: {} {}", method, path);

    if method == Method::OPTIONS {
        return next.run(request).await;
    }

    let Some(token) = extract_api_key(request.headers()).map(str::to_string) else {
        return error_response(&ProxyError::Unauthorized { message: "missing API key".to_string() });
    };

    match state.collaborators.users.find_by_token(&token).await {
        Some(user) => {
            tracing::debug!(user_id = %user.id, "Caller authenticated");
            request.extensions_mut().insert(AuthenticatedUser { user, token });
            next.run(request).await
        },
        None => {
            tracing::warn!("Rejected unknown API key on {} {}", method, path);
            error_response(&ProxyError::Unauthorized { message: "invalid API key".to_string() })
        },
    }
}

/// Operator endpoints. Open when no admin key is configured.
pub async fn admin_auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if is_health_check(path) || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let Some(admin_key) = state.config.admin_key.as_deref().filter(|k| !k.is_empty()) else {
        return next.run(request).await;
    };

    let authorized = extract_api_key(request.headers()).is_some_and(|k| constant_time_compare(k, admin_key));
    if authorized {
        next.run(request).await
    } else {
        tracing::warn!("Admin auth failed for {}", path);
        StatusCode::UNAUTHORIZED.into_response()
    }
}
