//! Resilient executor.
//!
//! Walks the candidate list, runs the per-provider retry loop, consults
//! admission control before every attempt and reports outcomes to the health
//! tracker. The first success (or a fatal error) ends the request.

mod attempt;
mod stream;

#[cfg(test)]
mod tests;

pub use attempt::{AdmissionReason, AttemptError, AttemptRecord, AuditEntry, NetworkErrorKind};

use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use modelmux_types::models::routing::is_auto_model;
use modelmux_types::protocol::ChatUsage;
use modelmux_types::{
    Candidate, GatewayConfig, ProviderConfig, ProxyError, RouteDecision, User,
};

use crate::proxy::admission::{is_model_allowed, QuotaEstimate, QuotaManager, RateLimiter};
use crate::proxy::collaborators::{AuditSink, ProviderRegistry, UsageStore};
use crate::proxy::health::HealthTracker;
use crate::proxy::retry::BackoffPolicy;
use crate::proxy::routing::REASON_NO_PROVIDER_FOR_EXPLICIT;
use crate::proxy::stream_guard::sanitize_completion;
use crate::proxy::upstream::UpstreamClient;
use crate::utils::now_ms;

use stream::{guarded_stream, StreamFinalizer, UsageRecorder};

/// Status recorded in the audit trail for client disconnects.
const CLIENT_CLOSED_STATUS: u16 = 499;

/// One routed request ready for execution.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub trace_id: String,
    pub user: User,
    /// Bearer token the caller authenticated with
    pub token: String,
    pub requested_model: String,
    /// Client body with gateway-only fields removed
    pub body: Value,
    pub streaming: bool,
    pub estimate: QuotaEstimate,
    pub decision: RouteDecision,
}

/// Upstream headers that describe the upstream connection or body encoding.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "content-encoding",
    "content-length",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream response headers worth handing to the client.
pub fn forwarded_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in upstream {
        if HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

pub enum ExecutionOutcome {
    Json { status: u16, provider: String, model: String, headers: HeaderMap, body: Value },
    Stream {
        status: u16,
        provider: String,
        model: String,
        headers: HeaderMap,
        stream: BoxStream<'static, Result<Bytes, std::io::Error>>,
    },
    Failed(ProxyError),
}

impl std::fmt::Debug for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json { status, provider, model, .. } => f
                .debug_struct("Json")
                .field("status", status)
                .field("provider", provider)
                .field("model", model)
                .finish_non_exhaustive(),
            Self::Stream { status, provider, model, .. } => f
                .debug_struct("Stream")
                .field("status", status)
                .field("provider", provider)
                .field("model", model)
                .finish_non_exhaustive(),
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

impl ExecutionOutcome {
    pub fn status(&self) -> u16 {
        match self {
            Self::Json { status, .. } | Self::Stream { status, .. } => *status,
            Self::Failed(e) => e.http_status_code(),
        }
    }
}

/// Result of trying one provider.
enum ProviderResult {
    Done(ExecutionOutcome),
    /// Give up on this provider, try the next candidate
    Next(AttemptError),
    /// Stop the whole request with this error
    Fatal(AttemptError),
}

/// Shared dependencies of the executor.
#[derive(Clone)]
pub struct ResilientExecutor {
    config: Arc<GatewayConfig>,
    registry: Arc<dyn ProviderRegistry>,
    health: Arc<HealthTracker>,
    rate_limiter: Arc<RateLimiter>,
    quota: Arc<QuotaManager>,
    usage: Arc<dyn UsageStore>,
    audit: Arc<dyn AuditSink>,
    upstream: UpstreamClient,
    backoff: BackoffPolicy,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("retry_max", &self.config.retry_max)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ResilientExecutor {
    #[allow(clippy::too_many_arguments, reason = "Wiring constructor, called once at startup")]
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<dyn ProviderRegistry>,
        health: Arc<HealthTracker>,
        rate_limiter: Arc<RateLimiter>,
        quota: Arc<QuotaManager>,
        usage: Arc<dyn UsageStore>,
        audit: Arc<dyn AuditSink>,
        upstream: UpstreamClient,
    ) -> Self {
        let backoff = BackoffPolicy::from_config(&config);
        Self { config, registry, health, rate_limiter, quota, usage, audit, upstream, backoff }
    }

    /// Model sent upstream for `candidate`.
    pub fn effective_model(&self, candidate: &Candidate, provider: &ProviderConfig, requested: &str) -> String {
        if let Some(model) = candidate.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return model.to_string();
        }
        if is_auto_model(requested) {
            if let Some(model) = provider.default_model.as_deref().filter(|m| !m.trim().is_empty()) {
                return model.to_string();
            }
        } else {
            return requested.trim().to_string();
        }
        self.config.fallback_model.clone()
    }

    /// Run the request against its candidates until one succeeds.
    ///
    /// `cancel` aborts pending backoff sleeps, in-flight upstream calls and
    /// the stream pump.
    pub async fn execute(&self, req: ExecutionRequest, cancel: CancellationToken) -> ExecutionOutcome {
        let started = Instant::now();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<(String, AttemptError)> = None;
        let allowed = req.user.provider_filter();

        for candidate in &req.decision.candidates {
            let provider = candidate.provider.as_str();
            if self.health.is_suppressed(provider) {
                debug!("[{}] Skipping suppressed provider {}", req.trace_id, provider);
                continue;
            }

            let Some(provider_cfg) = self.registry.get_provider_config(provider, allowed).await else {
                let err = AttemptError::NotConfigured;
                warn!("[{}] Provider {} not configured, skipping", req.trace_id, provider);
                attempts.push(AttemptRecord::failed(provider, candidate.model.as_deref(), 0, &err, 0));
                last_error = Some((provider.to_string(), err));
                continue;
            };
            let Some(api_key) = provider_cfg.api_key.clone() else {
                let err = AttemptError::MissingApiKey;
                warn!("[{}] Provider {} has no API key, skipping", req.trace_id, provider);
                attempts.push(AttemptRecord::failed(provider, candidate.model.as_deref(), 0, &err, 0));
                last_error = Some((provider.to_string(), err));
                continue;
            };

            let model = self.effective_model(candidate, &provider_cfg, &req.requested_model);
            let mut body = req.body.clone();
            if let Some(obj) = body.as_object_mut() {
                obj.insert("model".to_string(), Value::String(model.clone()));
                obj.insert("stream".to_string(), Value::Bool(req.streaming));
            }

            let target = Target { provider, config: &provider_cfg, api_key: &api_key, model: &model, body: &body };
            match self.try_provider(&req, &target, &cancel, &mut attempts).await {
                ProviderResult::Done(outcome) => {
                    return self.finish(&req, started, attempts, outcome, Some((provider, &model)));
                },
                ProviderResult::Next(err) => {
                    info!("[{}] Failing over from {}: {}", req.trace_id, provider, err);
                    last_error = Some((provider.to_string(), err));
                },
                ProviderResult::Fatal(AttemptError::Cancelled) => {
                    debug!("[{}] Client went away during {}", req.trace_id, provider);
                    let outcome = ExecutionOutcome::Failed(AttemptError::Cancelled.into_proxy_error(provider));
                    return self.finish_with_status(&req, started, attempts, outcome, None, CLIENT_CLOSED_STATUS);
                },
                ProviderResult::Fatal(err) => {
                    let outcome = ExecutionOutcome::Failed(err.into_proxy_error(provider));
                    return self.finish(&req, started, attempts, outcome, None);
                },
            }
        }

        let error = match last_error {
            Some((provider, err)) => err.into_proxy_error(&provider),
            None if req.decision.reason == REASON_NO_PROVIDER_FOR_EXPLICIT => {
                ProxyError::NoProviderForModel { model: req.requested_model.clone() }
            },
            None => ProxyError::NoCandidates,
        };
        warn!("[{}] All candidates exhausted: {}", req.trace_id, error);
        self.finish(&req, started, attempts, ExecutionOutcome::Failed(error), None)
    }

    async fn try_provider(
        &self,
        req: &ExecutionRequest,
        target: &Target<'_>,
        cancel: &CancellationToken,
        attempts: &mut Vec<AttemptRecord>,
    ) -> ProviderResult {
        let provider = target.provider;
        let model = target.model;
        let retry_max = self.config.retry_max;
        let mut last = AttemptError::Internal { message: "no attempt made".to_string() };

        for attempt in 0..=retry_max {
            if let Err(reason) = self.admit(req, provider, model).await {
                let err = AttemptError::Admission { reason };
                info!("[{}] {} rejected by admission control: {}", req.trace_id, provider, err);
                attempts.push(AttemptRecord::failed(provider, Some(model), attempt, &err, 0));
                return ProviderResult::Next(err);
            }

            let call_started = Instant::now();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(AttemptError::Cancelled),
                r = self.upstream.chat_completions(target.config, target.api_key, target.body, req.streaming) => r,
            };
            let latency_ms = call_started.elapsed().as_millis() as u64;

            let err = match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match self.deliver(req, target, response, latency_ms, cancel).await {
                        Ok(outcome) => {
                            attempts.push(AttemptRecord::succeeded(provider, model, attempt, status, latency_ms));
                            return ProviderResult::Done(outcome);
                        },
                        Err(e) => e,
                    }
                },
                Err(e) => e,
            };

            attempts.push(AttemptRecord::failed(provider, Some(model), attempt, &err, latency_ms));
            if matches!(err, AttemptError::Cancelled) {
                return ProviderResult::Fatal(err);
            }
            if err.counts_against_health() {
                self.health.record_failure(provider, &err.to_string());
            }
            if !err.is_retryable() {
                warn!("[{}] {} failed with non-retryable error: {}", req.trace_id, provider, err);
                return ProviderResult::Fatal(err);
            }

            if attempt < retry_max {
                let retry_after = match &err {
                    AttemptError::Upstream { retry_after, .. } => *retry_after,
                    _ => None,
                };
                let delay = self.backoff.delay_for(attempt, retry_after);
                info!(
                    "[{}] {} attempt {}/{} failed ({}), retrying in {}ms",
                    req.trace_id,
                    provider,
                    attempt + 1,
                    retry_max + 1,
                    err,
                    delay.as_millis()
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return ProviderResult::Fatal(AttemptError::Cancelled),
                    () = tokio::time::sleep(delay) => {},
                }
                last = err;
                continue;
            }

            if err.status() == Some(429) && !self.config.failover_on_429 {
                return ProviderResult::Fatal(err);
            }
            return ProviderResult::Next(err);
        }
        ProviderResult::Next(last)
    }

    /// Quota, rate limit and model access, in that order.
    async fn admit(&self, req: &ExecutionRequest, provider: &str, model: &str) -> Result<(), AdmissionReason> {
        self.quota.check_quota(&req.user, req.estimate).await.map_err(AdmissionReason::Quota)?;
        self.rate_limiter
            .check(&req.user, provider)
            .map_err(|r| AdmissionReason::RateLimit { retry_after_ms: r.retry_after_ms })?;
        if !is_model_allowed(&req.user, provider, model) {
            return Err(AdmissionReason::ModelNotAllowed { model: model.to_string() });
        }
        Ok(())
    }

    /// Turn a successful upstream response into the client outcome.
    async fn deliver(
        &self,
        req: &ExecutionRequest,
        target: &Target<'_>,
        response: reqwest::Response,
        latency_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, AttemptError> {
        let status = response.status().as_u16();
        let headers = forwarded_headers(response.headers());
        let recorder = UsageRecorder {
            quota: self.quota.clone(),
            store: self.usage.clone(),
            user: req.user.clone(),
            token: req.token.clone(),
            provider: target.provider.to_string(),
            model: target.model.to_string(),
        };

        if req.streaming {
            self.health.record_success(target.provider, latency_ms);
            let finalizer = StreamFinalizer::new(recorder, req.estimate.prompt_tokens);
            let stream = guarded_stream(req.trace_id.clone(), response, cancel.clone(), finalizer);
            return Ok(ExecutionOutcome::Stream {
                status,
                provider: target.provider.to_string(),
                model: target.model.to_string(),
                headers,
                stream,
            });
        }

        let parsed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AttemptError::Cancelled),
            r = response.json::<Value>() => r,
        };
        let mut body = parsed.map_err(|e| {
            if e.is_decode() {
                AttemptError::Internal { message: format!("malformed upstream body: {}", e) }
            } else {
                AttemptError::from_reqwest(&e)
            }
        })?;
        self.health.record_success(target.provider, latency_ms);

        let (prompt, completion) = ChatUsage::from_body(&body)
            .map_or((req.estimate.prompt_tokens, 0), |u| (u.prompt_tokens, u.completion_tokens));
        recorder.record(prompt, completion).await;

        sanitize_completion(&mut body);
        Ok(ExecutionOutcome::Json {
            status,
            provider: target.provider.to_string(),
            model: target.model.to_string(),
            headers,
            body,
        })
    }

    fn finish(
        &self,
        req: &ExecutionRequest,
        started: Instant,
        attempts: Vec<AttemptRecord>,
        outcome: ExecutionOutcome,
        served: Option<(&str, &str)>,
    ) -> ExecutionOutcome {
        let status = outcome.status();
        self.finish_with_status(req, started, attempts, outcome, served, status)
    }

    /// Emit the audit entry and hand back `outcome`.
    fn finish_with_status(
        &self,
        req: &ExecutionRequest,
        started: Instant,
        attempts: Vec<AttemptRecord>,
        outcome: ExecutionOutcome,
        served: Option<(&str, &str)>,
        status: u16,
    ) -> ExecutionOutcome {
        let entry = AuditEntry {
            trace_id: req.trace_id.clone(),
            user_id: req.user.id.clone(),
            requested_model: req.requested_model.clone(),
            intent: req.decision.intent.clone(),
            route_reason: req.decision.reason.clone(),
            provider: served.map(|(p, _)| p.to_string()),
            model: served.map(|(_, m)| m.to_string()),
            status,
            streamed: matches!(outcome, ExecutionOutcome::Stream { .. }),
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: now_ms(),
        };
        self.audit.record_audit(entry);
        outcome
    }
}

/// Resolved provider for one candidate.
struct Target<'a> {
    provider: &'a str,
    config: &'a ProviderConfig,
    api_key: &'a str,
    model: &'a str,
    body: &'a Value,
}
