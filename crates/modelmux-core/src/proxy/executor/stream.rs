//! Stream pump: upstream SSE bytes -> stream guard -> client.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use modelmux_types::protocol::ChatUsage;
use modelmux_types::User;

use crate::proxy::admission::{QuotaManager, UsageReport};
use crate::proxy::collaborators::{UsageEvent, UsageStore};
use crate::proxy::stream_guard::StreamGuard;

/// Persists usage for one served request.
#[derive(Clone)]
pub(crate) struct UsageRecorder {
    pub quota: Arc<QuotaManager>,
    pub store: Arc<dyn UsageStore>,
    pub user: User,
    pub token: String,
    pub provider: String,
    pub model: String,
}

impl UsageRecorder {
    pub async fn record(&self, prompt_tokens: u64, completion_tokens: u64) {
        let report = UsageReport {
            provider: self.provider.clone(),
            model: self.model.clone(),
            prompt_tokens,
            completion_tokens,
        };
        self.quota.record_usage(&self.user, &report).await;
        let event = UsageEvent { provider: self.provider.clone(), model: self.model.clone() };
        self.store.record_user_usage(&self.user.id, &self.token, &event).await;
    }
}

/// Collects usage from forwarded `data:` lines.
#[derive(Debug, Default)]
pub(crate) struct UsageScanner {
    reported: Option<ChatUsage>,
    content_chars: usize,
}

impl UsageScanner {
    pub fn scan(&mut self, forwarded: &[u8]) {
        for line in forwarded.split(|b| *b == b'\n') {
            let Some(payload) = line.strip_prefix(b"data:") else {
                continue;
            };
            let payload = payload.trim_ascii();
            if payload.is_empty() || payload == b"[DONE]" {
                continue;
            }
            let Ok(event) = serde_json::from_slice::<Value>(payload) else {
                continue;
            };
            if let Some(usage) = ChatUsage::from_body(&event) {
                self.reported = Some(usage);
            }
            if let Some(choices) = event.get("choices").and_then(Value::as_array) {
                self.content_chars += choices
                    .iter()
                    .filter_map(|c| c.pointer("/delta/content").and_then(Value::as_str))
                    .map(|s| s.chars().count())
                    .sum::<usize>();
            }
        }
    }

    /// Reported usage, or an estimate from the streamed content.
    pub fn totals(&self, prompt_estimate: u64) -> (u64, u64) {
        match &self.reported {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (prompt_estimate, self.content_chars.div_ceil(4) as u64),
        }
    }
}

/// Records stream usage exactly once: on normal end or when dropped.
pub(crate) struct StreamFinalizer {
    recorder: Option<UsageRecorder>,
    scanner: UsageScanner,
    prompt_estimate: u64,
}

impl StreamFinalizer {
    pub fn new(recorder: UsageRecorder, prompt_estimate: u64) -> Self {
        Self { recorder: Some(recorder), scanner: UsageScanner::default(), prompt_estimate }
    }

    pub fn scan(&mut self, forwarded: &[u8]) {
        self.scanner.scan(forwarded);
    }

    fn finish(&mut self) {
        let Some(recorder) = self.recorder.take() else {
            return;
        };
        let (prompt, completion) = self.scanner.totals(self.prompt_estimate);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(user_id = %recorder.user.id, "No async runtime, stream usage dropped");
            return;
        };
        handle.spawn(async move {
            recorder.record(prompt, completion).await;
        });
    }
}

impl Drop for StreamFinalizer {
    fn drop(&mut self) {
        self.finish();
    }
}

enum Step {
    Cancelled,
    Next(Option<Result<Bytes, reqwest::Error>>),
}

fn sse_error_event(message: &str) -> Bytes {
    let event = serde_json::json!({
        "error": { "message": message, "type": "upstream_error", "code": "stream_interrupted" }
    });
    Bytes::from(format!("data: {}\n\n", event))
}

/// Pipe an upstream streaming response through a fresh [`StreamGuard`].
///
/// Ends on EOF, truncation, upstream error or cancellation. Usage is
/// recorded when the stream ends or is dropped by a disconnecting client.
pub(crate) fn guarded_stream(
    trace_id: String,
    response: reqwest::Response,
    cancel: CancellationToken,
    mut finalizer: StreamFinalizer,
) -> BoxStream<'static, Result<Bytes, std::io::Error>> {
    let stream = async_stream::stream! {
        let mut upstream = response.bytes_stream();
        let mut guard = StreamGuard::new();

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Cancelled,
                next = upstream.next() => Step::Next(next),
            };

            match step {
                Step::Cancelled => {
                    debug!("[{}] Stream cancelled by client", trace_id);
                    break;
                },
                Step::Next(Some(Ok(chunk))) => {
                    let out = guard.push(&chunk);
                    finalizer.scan(&out);
                    if !out.is_empty() {
                        yield Ok(out);
                    }
                    if guard.is_truncated() {
                        debug!("[{}] Stream truncated after {} lines", trace_id, guard.line_count());
                        break;
                    }
                },
                Step::Next(Some(Err(e))) => {
                    warn!("[{}] Upstream stream error: {}", trace_id, e);
                    yield Ok(sse_error_event(&e.to_string()));
                    break;
                },
                Step::Next(None) => {
                    let tail = guard.finish();
                    finalizer.scan(&tail);
                    if !tail.is_empty() {
                        yield Ok(tail);
                    }
                    break;
                },
            }
        }
        drop(finalizer);
    };
    stream.boxed()
}
