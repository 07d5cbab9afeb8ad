// OpenAI chat completions: route, execute, respond
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::info;

use modelmux_types::protocol::ChatMessage;
use modelmux_types::{ProxyError, RouteDecision};

use super::error_response;
use crate::proxy::admission::{estimate_prompt_tokens, QuotaEstimate};
use crate::proxy::executor::{ExecutionOutcome, ExecutionRequest};
use crate::proxy::intent::IntentSignals;
use crate::proxy::middleware::AuthenticatedUser;
use crate::proxy::routing::rules::parse_rules_lenient;
use crate::proxy::routing::{eligible_providers, RouteRequest};
use crate::proxy::server::AppState;
use crate::utils::new_trace_id;

pub const HEADER_REQUEST_ID: &str = "x-request-id";
pub const HEADER_ROUTED_PROVIDER: &str = "x-routed-provider";
pub const HEADER_ROUTED_MODEL: &str = "x-routed-model";
pub const HEADER_ROUTE_REASON: &str = "x-route-reason";
pub const HEADER_ROUTE_INTENT: &str = "x-route-intent";
pub const HEADER_INTENT_HINT: &str = "x-intent-hint";

/// Body fields consumed by the gateway and never forwarded.
const FIELD_INTENT: &str = "intent";
const FIELD_ROUTING_RULES: &str = "routing_rules";

/// Keeps the request's cancellation guard alive for as long as the client
/// reads the body. Dropping the body cancels the upstream pump.
struct GuardedStream {
    inner: BoxStream<'static, Result<Bytes, std::io::Error>>,
    _guard: DropGuard,
}

impl Stream for GuardedStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), v);
    }
}

fn route_headers(headers: &mut HeaderMap, trace_id: &str, decision: &RouteDecision) {
    set_header(headers, HEADER_REQUEST_ID, trace_id);
    set_header(headers, HEADER_ROUTE_REASON, &decision.reason);
    set_header(headers, HEADER_ROUTE_INTENT, &decision.intent);
}

fn served_headers(headers: &mut HeaderMap, provider: &str, model: &str) {
    set_header(headers, HEADER_ROUTED_PROVIDER, provider);
    set_header(headers, HEADER_ROUTED_MODEL, model);
}

/// Routing hint from the body `intent` field, else the `X-Intent-Hint` header.
fn take_hint(body: &mut serde_json::Map<String, Value>, headers: &HeaderMap) -> Option<String> {
    let from_body = body.remove(FIELD_INTENT).and_then(|v| v.as_str().map(str::to_string));
    from_body
        .or_else(|| headers.get(HEADER_INTENT_HINT).and_then(|h| h.to_str().ok()).map(str::to_string))
        .filter(|h| !h.trim().is_empty())
}

pub async fn handle_chat_completions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    let trace_id = new_trace_id();

    let Some(fields) = body.as_object_mut() else {
        return with_request_id(
            error_response(&ProxyError::InvalidRequest { message: "body must be a JSON object".to_string() }),
            &trace_id,
        );
    };
    let hint = take_hint(fields, &headers);
    let rules_override = fields
        .remove(FIELD_ROUTING_RULES)
        .and_then(|v| v.as_array().map(|raw| parse_rules_lenient(raw)));

    let requested_model = body
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("auto")
        .to_string();
    let messages = ChatMessage::parse_list(&body);
    if messages.is_empty() {
        return with_request_id(
            error_response(&ProxyError::InvalidRequest {
                message: "messages must be a non-empty array".to_string(),
            }),
            &trace_id,
        );
    }
    let streaming = body.get("stream").and_then(Value::as_bool) != Some(false);

    let user = auth.user;
    let settings = state.collaborators.settings.get_routing_settings().await;
    let mode = state.routing.effective_mode(&settings);
    let rules = rules_override.unwrap_or(settings.rules);
    let providers = state.collaborators.registry.get_all_providers(user.provider_filter()).await;
    let eligible = eligible_providers(providers, &state.health);

    let signals = IntentSignals::from_messages(&messages);
    let decision = state.routing.route(
        &RouteRequest {
            user: &user,
            requested_model: &requested_model,
            signals: &signals,
            hint: hint.as_deref(),
            rules: &rules,
            mode,
        },
        &eligible,
    );
    info!(
        "[{}] user={} model={} intent={} reason={} candidates={:?}",
        trace_id,
        user.id,
        requested_model,
        decision.intent,
        decision.reason,
        decision.candidates.iter().map(|c| c.provider.as_str()).collect::<Vec<_>>()
    );

    let request = ExecutionRequest {
        trace_id: trace_id.clone(),
        user,
        token: auth.token,
        requested_model,
        body,
        streaming,
        estimate: QuotaEstimate { prompt_tokens: estimate_prompt_tokens(&messages), completion_tokens: 0 },
        decision: decision.clone(),
    };

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let outcome = state.executor.execute(request, cancel).await;

    let mut response = match outcome {
        ExecutionOutcome::Json { status, provider, model, headers, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let mut response = (status, Json(body)).into_response();
            upstream_headers(response.headers_mut(), headers);
            served_headers(response.headers_mut(), &provider, &model);
            response
        },
        ExecutionOutcome::Stream { status, provider, model, headers: upstream, stream } => {
            let body = Body::from_stream(GuardedStream { inner: stream, _guard: guard });
            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let headers = response.headers_mut();
            upstream_headers(headers, upstream);
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
            served_headers(headers, &provider, &model);
            response
        },
        ExecutionOutcome::Failed(err) => error_response(&err),
    };
    route_headers(response.headers_mut(), &trace_id, &decision);
    response
}

/// Copy upstream headers the gateway does not set itself.
fn upstream_headers(headers: &mut HeaderMap, upstream: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in upstream {
        if let Some(name) = name {
            current = (!headers.contains_key(&name)).then_some(name);
        }
        if let Some(name) = &current {
            headers.append(name.clone(), value);
        }
    }
}

fn with_request_id(mut response: Response, trace_id: &str) -> Response {
    set_header(response.headers_mut(), HEADER_REQUEST_ID, trace_id);
    response
}
