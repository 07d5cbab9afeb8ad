//! OpenAI-compatible upstream calls.

use reqwest::{header, Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use modelmux_types::ProviderConfig;

use crate::proxy::executor::{AttemptError, NetworkErrorKind};
use crate::proxy::retry::parse_retry_after;

/// Build the upstream request headers.
pub fn build_headers(api_key: &str, streaming: bool) -> Result<header::HeaderMap, String> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| e.to_string())?,
    );
    let accept = if streaming { "text/event-stream" } else { "application/json" };
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(accept));
    Ok(headers)
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http_client: Client,
    default_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(http_client: Client, default_timeout_secs: u64) -> Self {
        Self { http_client, default_timeout: Duration::from_secs(default_timeout_secs.max(1)) }
    }

    pub fn timeout_for(&self, provider: &ProviderConfig) -> Duration {
        provider.timeout_secs.map_or(self.default_timeout, |s| Duration::from_secs(s.max(1)))
    }

    /// POST `{base_url}/chat/completions`.
    ///
    /// Non-success statuses become [`AttemptError::Upstream`] with the body
    /// read in full. For streams the timeout covers the response head only.
    pub async fn chat_completions(
        &self,
        provider: &ProviderConfig,
        api_key: &str,
        body: &Value,
        streaming: bool,
    ) -> Result<Response, AttemptError> {
        let url = provider.chat_completions_url();
        let timeout = self.timeout_for(provider);
        let headers = build_headers(api_key, streaming)
            .map_err(|message| AttemptError::Internal { message })?;

        let mut request = self.http_client.post(&url).headers(headers).json(body);
        if !streaming {
            request = request.timeout(timeout);
        }

        debug!(url = %url, streaming, timeout_secs = timeout.as_secs(), "Calling upstream");
        let response = match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(AttemptError::from_reqwest(&e)),
            Err(_) => {
                return Err(AttemptError::Network {
                    kind: NetworkErrorKind::Timeout,
                    message: format!("no response within {}s", timeout.as_secs()),
                })
            },
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        Err(AttemptError::Upstream { status: status.as_u16(), body, retry_after })
    }
}
