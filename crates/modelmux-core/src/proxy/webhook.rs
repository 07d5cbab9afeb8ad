//! Best-effort JSON webhooks.
//!
//! Delivery happens on a spawned task. Failures are logged and never reach
//! the request path.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// POST `payload` to `url` in the background.
    ///
    /// Outside a tokio runtime the notification is dropped with a warning.
    pub fn notify(&self, url: &str, payload: Value) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(url = %url, "No async runtime available, webhook dropped");
            return;
        };
        let client = self.http_client.clone();
        let url = url.to_string();
        handle.spawn(async move {
            match client.post(&url).timeout(WEBHOOK_TIMEOUT).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %url, "Webhook delivered");
                },
                Ok(resp) => {
                    warn!(url = %url, status = resp.status().as_u16(), "Webhook rejected");
                },
                Err(e) => {
                    warn!(url = %url, error = %e, "Webhook delivery failed");
                },
            }
        });
    }
}

/// A notifier bound to one destination URL.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub notifier: WebhookNotifier,
    pub url: String,
}

impl WebhookTarget {
    pub fn new(notifier: WebhookNotifier, url: impl Into<String>) -> Self {
        Self { notifier, url: url.into() }
    }

    pub fn send(&self, payload: Value) {
        self.notifier.notify(&self.url, payload);
    }
}
