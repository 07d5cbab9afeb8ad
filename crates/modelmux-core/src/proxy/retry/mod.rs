//! Retry classification and backoff.

use rand::Rng;
use std::time::Duration;

use modelmux_types::GatewayConfig;

/// HTTP status codes retried against the same provider.
pub const RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// Upper bound of the random jitter added to computed delays.
pub const MAX_JITTER_MS: u64 = 100;

#[inline]
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Exponential backoff with jitter, capped at `max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl BackoffPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self { base_ms: config.retry_base_ms, max_ms: config.retry_max_ms }
    }

    /// `min(base * 2^attempt + jitter, max)` for a 0-based attempt.
    pub fn computed_delay_ms(&self, attempt: u32, jitter_ms: u64) -> u64 {
        self.base_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .saturating_add(jitter_ms.min(MAX_JITTER_MS))
            .min(self.max_ms)
    }

    /// Delay before retry number `attempt + 1`.
    ///
    /// A `Retry-After` value from the upstream is honored up to `max_ms`;
    /// otherwise the jittered exponential delay applies.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let ms = match retry_after {
            Some(hint) => u64::try_from(hint.as_millis()).unwrap_or(u64::MAX).min(self.max_ms),
            None => {
                let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
                self.computed_delay_ms(attempt, jitter)
            },
        };
        Duration::from_millis(ms)
    }
}

/// Parse a `Retry-After` header: delta-seconds (fractions allowed) or an HTTP date.
///
/// Values too large for a `Duration` saturate; the caller caps them anyway.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        return Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: BackoffPolicy = BackoffPolicy { base_ms: 500, max_ms: 4000 };

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{} should retry", status);
        }
        for status in [400, 401, 403, 404, 422, 501] {
            assert!(!is_retryable_status(status), "{} should not retry", status);
        }
    }

    #[test]
    fn test_delay_bounds_without_header() {
        for attempt in 0..6_u32 {
            let floor = (500_u64 << attempt).min(4000);
            for _ in 0..20 {
                let ms = POLICY.delay_for(attempt, None).as_millis() as u64;
                assert!(ms >= floor, "attempt {}: {} < {}", attempt, ms, floor);
                assert!(ms <= (floor + MAX_JITTER_MS).min(4000));
            }
        }
    }

    #[test]
    fn test_computed_delay_is_deterministic_given_jitter() {
        assert_eq!(POLICY.computed_delay_ms(0, 0), 500);
        assert_eq!(POLICY.computed_delay_ms(1, 40), 1040);
        assert_eq!(POLICY.computed_delay_ms(3, 100), 4000);
        assert_eq!(POLICY.computed_delay_ms(40, 0), 4000);
    }

    #[test]
    fn test_retry_after_is_capped() {
        assert_eq!(POLICY.delay_for(0, Some(Duration::from_secs(2))), Duration::from_millis(2000));
        assert_eq!(POLICY.delay_for(0, Some(Duration::from_secs(30))), Duration::from_millis(4000));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO),
            "past dates mean retry now"
        );
    }

    #[test]
    fn test_huge_retry_after_saturates() {
        for raw in ["1e300", "18446744073709551616"] {
            let parsed = parse_retry_after(raw);
            assert_eq!(parsed, Some(Duration::MAX), "{}", raw);
            assert_eq!(POLICY.delay_for(0, parsed), Duration::from_millis(4000));
        }
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("NaN"), None);
    }
}
