use std::time::Duration;

use crate::error::AppResult;

/// Build the shared upstream HTTP client.
///
/// Per-request timeouts are set by the caller from the provider config; the
/// client only carries connection-level limits.
pub fn build_http_client(connect_timeout_secs: u64) -> AppResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs.max(1)))
        .tcp_nodelay(true)
        .http2_keep_alive_interval(Duration::from_secs(25))
        .http2_keep_alive_timeout(Duration::from_secs(10))
        .http2_keep_alive_while_idle(true)
        .build()?;
    Ok(client)
}
