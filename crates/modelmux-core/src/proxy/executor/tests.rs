use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelmux_types::{Billing, Provider, QuotaLimits, UsageTotals};

use super::*;
use crate::proxy::collaborators::{InMemoryUserStore, StaticProviderRegistry};
use crate::proxy::health::HealthConfig;

#[derive(Default)]
struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditSink for RecordingAudit {
    fn record_audit(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }
}

impl RecordingAudit {
    fn last(&self) -> AuditEntry {
        self.entries.lock().last().cloned().expect("audit entry")
    }
}

struct Harness {
    executor: ResilientExecutor,
    health: Arc<HealthTracker>,
    store: Arc<InMemoryUserStore>,
    audit: Arc<RecordingAudit>,
}

fn fast_config() -> GatewayConfig {
    GatewayConfig { retry_base_ms: 1, retry_max_ms: 5, ..GatewayConfig::default() }
}

fn provider(server: &MockServer, name: &str, key: Option<&str>) -> Provider {
    Provider {
        name: name.to_string(),
        base_url: format!("{}/{}/v1", server.uri(), name),
        api_key: key.map(str::to_string),
        default_model: None,
        timeout_secs: Some(5),
    }
}

fn user() -> User {
    User { id: "u1".into(), api_keys: vec!["tok".into()], ..Default::default() }
}

fn harness(config: GatewayConfig, providers: Vec<Provider>, users: Vec<User>) -> Harness {
    let config = Arc::new(config);
    let store = Arc::new(InMemoryUserStore::new(users));
    let health = Arc::new(HealthTracker::new(HealthConfig::from(config.as_ref())));
    let audit = Arc::new(RecordingAudit::default());
    let executor = ResilientExecutor::new(
        config.clone(),
        Arc::new(StaticProviderRegistry::new(providers)),
        health.clone(),
        Arc::new(RateLimiter::from_config(&config)),
        Arc::new(QuotaManager::new(store.clone(), vec![])),
        store.clone(),
        audit.clone(),
        UpstreamClient::new(reqwest::Client::new(), 5),
    );
    Harness { executor, health, store, audit }
}

fn request(user: User, candidates: &[(&str, Option<&str>)], streaming: bool) -> ExecutionRequest {
    let candidates: Vec<Candidate> = candidates
        .iter()
        .map(|(p, m)| Candidate::new(*p, m.map(str::to_string), format!("rule:default->{}", p)))
        .collect();
    let reason = candidates.first().map_or("fallback".to_string(), |c| c.reason.clone());
    ExecutionRequest {
        trace_id: "req_test".into(),
        user,
        token: "tok".into(),
        requested_model: "auto".into(),
        body: json!({"messages": [{"role": "user", "content": "hi"}], "stream": streaming}),
        streaming,
        estimate: QuotaEstimate { prompt_tokens: 1, completion_tokens: 0 },
        decision: RouteDecision { candidates, intent: "default".into(), reason },
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "cmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4}
    })
}

async fn mount(server: &MockServer, name: &str, response: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/v1/chat/completions", name)))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_success_sanitizes_and_records_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/groq/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "llama-3.1-8b-instant", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("\n\nhello\n--- round 2\n")))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(fast_config(), vec![provider(&server, "groq", Some("sk"))], vec![user()]);
    let outcome = h
        .executor
        .execute(request(user(), &[("groq", Some("llama-3.1-8b-instant"))], false), CancellationToken::new())
        .await;

    let ExecutionOutcome::Json { status, provider, body, .. } = outcome else {
        panic!("expected json outcome, got {:?}", outcome);
    };
    assert_eq!(status, 200);
    assert_eq!(provider, "groq");
    assert_eq!(body["choices"][0]["message"]["content"], "hello\n");

    let billing = h.store.load_billing("u1").await.expect("billing");
    assert_eq!(billing.totals.total_requests, 1);
    assert_eq!(billing.totals.total_prompt_tokens, 12);
    assert_eq!(billing.totals.total_completion_tokens, 4);
    assert_eq!(h.store.token_request_count("tok"), 1);

    let record = h.health.record("groq").expect("health record");
    assert_eq!(record.success_count, 1);
    assert_eq!(h.audit.last().status, 200);
}

#[tokio::test]
async fn test_quota_exhausted_never_calls_upstream() {
    let server = MockServer::start().await;
    mount(&server, "openai", ResponseTemplate::new(200).set_body_json(completion("x")), 0).await;
    mount(&server, "groq", ResponseTemplate::new(200).set_body_json(completion("x")), 0).await;

    let capped = User {
        billing: Billing {
            limits: QuotaLimits { max_requests: 5, ..Default::default() },
            totals: UsageTotals { total_requests: 5, ..Default::default() },
            ..Default::default()
        },
        ..user()
    };
    let h = harness(
        fast_config(),
        vec![provider(&server, "openai", Some("sk")), provider(&server, "groq", Some("sk"))],
        vec![capped.clone()],
    );
    let outcome = h
        .executor
        .execute(request(capped, &[("openai", None), ("groq", None)], false), CancellationToken::new())
        .await;

    let ExecutionOutcome::Failed(err) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert_eq!(err.http_status_code(), 429);
    assert_eq!(err.error_code().as_deref(), Some("quota_requests"));

    let audit = h.audit.last();
    assert_eq!(audit.attempts.len(), 2);
    for attempt in &audit.attempts {
        assert_eq!(attempt.status, Some(429));
        assert_eq!(attempt.error.as_deref(), Some("quota_requests"));
    }
    assert_eq!(audit.attempts[1].provider, "groq");
}

#[tokio::test]
async fn test_non_retryable_error_does_not_fail_over() {
    let server = MockServer::start().await;
    mount(
        &server,
        "openai",
        ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "bad", "type": "invalid_request_error"}})),
        1,
    )
    .await;
    mount(&server, "groq", ResponseTemplate::new(200).set_body_json(completion("x")), 0).await;

    let h = harness(
        fast_config(),
        vec![provider(&server, "openai", Some("sk")), provider(&server, "groq", Some("sk"))],
        vec![user()],
    );
    let outcome = h
        .executor
        .execute(request(user(), &[("openai", None), ("groq", None)], false), CancellationToken::new())
        .await;

    let ExecutionOutcome::Failed(err) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert_eq!(err.http_status_code(), 400);
    assert_eq!(err.to_envelope()["error"]["message"], "bad");
    // Client errors say nothing about provider health.
    assert!(h.health.record("openai").is_none());

    let audit = h.audit.last();
    assert_eq!(audit.status, 400);
    assert_eq!(audit.provider, None);
    assert_eq!(audit.model, None);
    assert_eq!(audit.attempts[0].provider, "openai");
}

#[tokio::test]
async fn test_success_carries_upstream_headers() {
    let server = MockServer::start().await;
    mount(
        &server,
        "groq",
        ResponseTemplate::new(200)
            .insert_header("x-ratelimit-remaining-requests", "41")
            .insert_header("openai-processing-ms", "87")
            .set_body_json(completion("hi")),
        1,
    )
    .await;

    let h = harness(fast_config(), vec![provider(&server, "groq", Some("sk"))], vec![user()]);
    let outcome = h.executor.execute(request(user(), &[("groq", None)], false), CancellationToken::new()).await;

    let ExecutionOutcome::Json { headers, .. } = outcome else {
        panic!("expected json outcome, got {:?}", outcome);
    };
    assert_eq!(headers.get("x-ratelimit-remaining-requests").expect("rate limit header"), "41");
    assert_eq!(headers.get("openai-processing-ms").expect("timing header"), "87");
    assert!(headers.get("content-length").is_none());
}

#[test]
fn test_forwarded_headers_drop_connection_headers() {
    let mut upstream = HeaderMap::new();
    upstream.insert("connection", "keep-alive".parse().unwrap());
    upstream.insert("keep-alive", "timeout=5".parse().unwrap());
    upstream.insert("transfer-encoding", "chunked".parse().unwrap());
    upstream.insert("content-length", "120".parse().unwrap());
    upstream.insert("content-encoding", "gzip".parse().unwrap());
    upstream.insert("retry-after", "3".parse().unwrap());
    upstream.append("x-ratelimit-limit-requests", "100".parse().unwrap());

    let forwarded = forwarded_headers(&upstream);
    assert_eq!(forwarded.len(), 2);
    assert_eq!(forwarded.get("retry-after").unwrap(), "3");
    assert_eq!(forwarded.get("x-ratelimit-limit-requests").unwrap(), "100");
}

#[tokio::test]
async fn test_server_errors_retry_then_fail_over() {
    let server = MockServer::start().await;
    mount(&server, "openai", ResponseTemplate::new(503), 3).await;
    mount(&server, "groq", ResponseTemplate::new(200).set_body_json(completion("ok")), 1).await;

    let h = harness(
        fast_config(),
        vec![provider(&server, "openai", Some("sk")), provider(&server, "groq", Some("sk"))],
        vec![user()],
    );
    let outcome = h
        .executor
        .execute(request(user(), &[("openai", None), ("groq", None)], false), CancellationToken::new())
        .await;

    assert!(matches!(&outcome, ExecutionOutcome::Json { provider, .. } if provider == "groq"));
    let audit = h.audit.last();
    assert_eq!(audit.attempts.len(), 4);
    assert_eq!(audit.provider.as_deref(), Some("groq"));
    assert_eq!(h.health.record("openai").expect("record").failure_streak, 3);
    assert!(h.health.is_suppressed("openai"));
}

#[tokio::test]
async fn test_retry_recovers_on_same_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount(&server, "openai", ResponseTemplate::new(200).set_body_json(completion("ok")), 1).await;

    let h = harness(fast_config(), vec![provider(&server, "openai", Some("sk"))], vec![user()]);
    let outcome = h
        .executor
        .execute(request(user(), &[("openai", Some("gpt-4o"))], false), CancellationToken::new())
        .await;

    assert_eq!(outcome.status(), 200);
    let record = h.health.record("openai").expect("record");
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.failure_streak, 0);
}

#[tokio::test]
async fn test_429_without_failover_is_surfaced() {
    let server = MockServer::start().await;
    mount(&server, "openai", ResponseTemplate::new(429), 3).await;
    mount(&server, "groq", ResponseTemplate::new(200).set_body_json(completion("x")), 0).await;

    let config = GatewayConfig { failover_on_429: false, ..fast_config() };
    let h = harness(
        config,
        vec![provider(&server, "openai", Some("sk")), provider(&server, "groq", Some("sk"))],
        vec![user()],
    );
    let outcome = h
        .executor
        .execute(request(user(), &[("openai", None), ("groq", None)], false), CancellationToken::new())
        .await;
    assert_eq!(outcome.status(), 429);
}

#[tokio::test]
async fn test_missing_key_and_denied_model_skip_to_next_candidate() {
    let server = MockServer::start().await;
    mount(&server, "groq", ResponseTemplate::new(200).set_body_json(completion("x")), 0).await;
    mount(&server, "mistral", ResponseTemplate::new(200).set_body_json(completion("x")), 1).await;

    let restricted = User { denied_models: vec!["llama-*".into()], ..user() };
    let h = harness(
        fast_config(),
        vec![
            provider(&server, "openai", None),
            provider(&server, "groq", Some("sk")),
            provider(&server, "mistral", Some("sk")),
        ],
        vec![restricted.clone()],
    );
    let outcome = h
        .executor
        .execute(
            request(
                restricted,
                &[("openai", None), ("groq", Some("llama-3.3-70b-versatile")), ("mistral", Some("mistral-small"))],
                false,
            ),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(&outcome, ExecutionOutcome::Json { provider, model, .. }
        if provider == "mistral" && model == "mistral-small"));
    let audit = h.audit.last();
    assert_eq!(audit.attempts[0].error.as_deref(), Some("provider has no API key configured"));
    assert_eq!(audit.attempts[1].status, Some(403));
    assert_eq!(audit.attempts[1].error.as_deref(), Some("model_not_allowed"));
}

#[tokio::test]
async fn test_suppressed_candidates_are_skipped() {
    let server = MockServer::start().await;
    mount(&server, "openai", ResponseTemplate::new(200).set_body_json(completion("x")), 0).await;
    mount(&server, "groq", ResponseTemplate::new(200).set_body_json(completion("x")), 1).await;

    let h = harness(
        fast_config(),
        vec![provider(&server, "openai", Some("sk")), provider(&server, "groq", Some("sk"))],
        vec![user()],
    );
    h.health.suppress("openai", None);
    let outcome = h
        .executor
        .execute(request(user(), &[("openai", None), ("groq", None)], false), CancellationToken::new())
        .await;
    assert_eq!(outcome.status(), 200);
}

#[tokio::test]
async fn test_cancelled_request_makes_no_upstream_call() {
    let server = MockServer::start().await;
    mount(&server, "openai", ResponseTemplate::new(200).set_body_json(completion("x")), 0).await;

    let h = harness(fast_config(), vec![provider(&server, "openai", Some("sk"))], vec![user()]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = h.executor.execute(request(user(), &[("openai", None)], false), cancel).await;

    assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
    assert_eq!(h.audit.last().status, 499);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let server = MockServer::start().await;
    mount(&server, "openai", ResponseTemplate::new(429).insert_header("retry-after", "30"), 1).await;

    let config = GatewayConfig { retry_max_ms: 60_000, ..fast_config() };
    let h = harness(config, vec![provider(&server, "openai", Some("sk"))], vec![user()]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = h.executor.execute(request(user(), &[("openai", None)], false), cancel).await;
    assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_no_candidates_is_unavailable() {
    let h = harness(fast_config(), vec![], vec![user()]);
    let outcome = h.executor.execute(request(user(), &[], false), CancellationToken::new()).await;
    let ExecutionOutcome::Failed(err) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(err, ProxyError::NoCandidates);
}

#[tokio::test]
async fn test_stream_is_guarded_and_usage_recorded_once() {
    let server = MockServer::start().await;
    let sse = concat!(
        "\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
        "--- round 2\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n"
    );
    mount(&server, "groq", ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"), 1).await;

    let h = harness(fast_config(), vec![provider(&server, "groq", Some("sk"))], vec![user()]);
    let outcome = h
        .executor
        .execute(request(user(), &[("groq", Some("llama-3.1-8b-instant"))], true), CancellationToken::new())
        .await;

    let ExecutionOutcome::Stream { stream, .. } = outcome else {
        panic!("expected stream, got {:?}", outcome);
    };
    assert!(h.audit.last().streamed);

    let chunks: Vec<Bytes> = stream.map(|c| c.expect("chunk")).collect().await;
    let text: String = chunks.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect();
    assert!(text.starts_with("data: {\"choices\""));
    assert!(!text.contains("round 2"));
    assert!(text.ends_with("data: [DONE]\n\n"));

    let mut billing = None;
    for _ in 0..50 {
        billing = h.store.load_billing("u1").await.filter(|b| b.totals.total_requests > 0);
        if billing.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let billing = billing.expect("usage recorded");
    assert_eq!(billing.totals.total_requests, 1);
    assert_eq!(billing.totals.total_prompt_tokens, 9);
    assert_eq!(billing.totals.total_completion_tokens, 3);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.store.load_billing("u1").await.expect("billing").totals.total_requests, 1);
}

#[test]
fn test_effective_model_precedence() {
    let h = harness(fast_config(), vec![], vec![]);
    let cfg = ProviderConfig {
        api_key: Some("k".into()),
        base_url: "https://x".into(),
        default_model: Some("default-m".into()),
        timeout_secs: None,
    };
    let bare = ProviderConfig { default_model: None, ..cfg.clone() };
    let routed = Candidate::new("p", Some("routed-m".into()), "r");
    let open = Candidate::new("p", None, "r");

    assert_eq!(h.executor.effective_model(&routed, &cfg, "auto"), "routed-m");
    assert_eq!(h.executor.effective_model(&open, &cfg, "auto"), "default-m");
    assert_eq!(h.executor.effective_model(&open, &cfg, "gpt-4o"), "gpt-4o");
    assert_eq!(h.executor.effective_model(&open, &bare, "auto"), "gpt-4o-mini");
}
