#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, reason = "integration test, panics are the assertion mechanism")]
#![allow(clippy::unwrap_used, reason = "integration test, panics are the assertion mechanism")]

use axum::http::{header, HeaderValue, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelmux_core::proxy::collaborators::{
    InMemoryUserStore, StaticProviderRegistry, StaticRoutingSettings, TracingAuditSink, UsageStore,
};
use modelmux_core::{build_proxy_router, AppState, Collaborators};
use modelmux_types::{Billing, GatewayConfig, Provider, QuotaLimits, RoutingSettings, UsageTotals, User};

fn provider(server: &MockServer, name: &str) -> Provider {
    Provider {
        name: name.to_string(),
        base_url: format!("{}/{}/v1", server.uri(), name),
        api_key: Some(format!("sk-{}", name)),
        default_model: None,
        timeout_secs: Some(10),
    }
}

fn user(billing: Billing) -> User {
    User { id: "u1".into(), api_keys: vec!["tok".into()], billing, ..Default::default() }
}

struct Gateway {
    server: axum_test::TestServer,
    store: Arc<InMemoryUserStore>,
}

fn gateway(config: GatewayConfig, providers: Vec<Provider>, users: Vec<User>) -> Gateway {
    let store = Arc::new(InMemoryUserStore::new(users));
    let collaborators = Collaborators {
        registry: Arc::new(StaticProviderRegistry::new(providers)),
        settings: Arc::new(StaticRoutingSettings::new(RoutingSettings::default())),
        users: store.clone(),
        usage: store.clone(),
        audit: Arc::new(TracingAuditSink),
    };
    let state = AppState::new(config, collaborators).expect("state");
    let server = axum_test::TestServer::new(build_proxy_router(state)).expect("test server");
    Gateway { server, store }
}

fn chat(text: &str, stream: bool) -> Value {
    json!({"model": "auto", "stream": stream, "messages": [{"role": "user", "content": text}]})
}

fn bearer() -> HeaderValue {
    HeaderValue::from_static("Bearer tok")
}

#[tokio::test]
async fn test_rate_limited_provider_fails_over_after_retry_after_waits() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/openai/.*"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .expect(3)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/groq/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "from groq"}}]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let gw = gateway(
        GatewayConfig::default(),
        vec![provider(&upstream, "openai"), provider(&upstream, "groq")],
        vec![user(Billing::default())],
    );

    let started = Instant::now();
    let response = gw
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, bearer())
        .json(&chat("```python\nprint(1)\n```", false))
        .await;
    let elapsed = started.elapsed();

    response.assert_status_ok();
    assert_eq!(response.headers().get("x-routed-provider").expect("header"), "groq");
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "from groq");
    assert!(elapsed >= Duration::from_millis(3900), "two ~2s waits expected, got {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(8), "waits should be capped, got {:?}", elapsed);
}

#[tokio::test]
async fn test_exhausted_quota_never_reaches_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .expect(0)
        .mount(&upstream)
        .await;

    let billing = Billing {
        limits: QuotaLimits { max_requests: 5, ..Default::default() },
        totals: UsageTotals { total_requests: 5, ..Default::default() },
        ..Default::default()
    };
    let gw = gateway(
        GatewayConfig::default(),
        vec![provider(&upstream, "openai"), provider(&upstream, "groq")],
        vec![user(billing)],
    );

    let response = gw
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, bearer())
        .json(&chat("hello", false))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "quota_requests");
    assert_eq!(body["error"]["type"], "insufficient_quota");
}

#[tokio::test]
async fn test_runaway_stream_is_truncated() {
    let upstream = MockServer::start().await;
    let sse: String = (0..300)
        .map(|i| format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n", i))
        .collect();
    Mock::given(method("POST"))
        .and(path_regex(r"^/groq/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let gw = gateway(GatewayConfig::default(), vec![provider(&upstream, "groq")], vec![user(Billing::default())]);
    let response = gw
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, bearer())
        .json(&chat("hello", true))
        .await;

    response.assert_status_ok();
    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.iter().filter(|l| l.starts_with("data: ")).count(), 200);
    assert!(text.ends_with("[truncated]\n\n[stream closed]"));

    for _ in 0..50 {
        if gw.store.token_request_count("tok") > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(gw.store.token_request_count("tok"), 1);
    let billing = gw.store.load_billing("u1").await.expect("billing");
    assert_eq!(billing.totals.total_requests, 1);
}

#[tokio::test]
async fn test_upstream_client_error_is_passed_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/openai/.*"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "model not found", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/groq/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let gw = gateway(
        GatewayConfig::default(),
        vec![provider(&upstream, "openai"), provider(&upstream, "groq")],
        vec![user(Billing::default())],
    );
    let response = gw
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, bearer())
        .json(&json!({"model": "gpt-5-imaginary", "stream": false, "messages": [{"role": "user", "content": "hi"}]}))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "model not found");
}
