use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;

const RETRY_BACKOFF_BASE_MS: u64 = 100;
const RETRY_BACKOFF_MAX_MS: u64 = 1_000;
const RETRY_AFTER_MAX_SECS: u64 = 30;
const RETRY_TRANSPORT_FAST_SECOND_MS: u64 = 10;

const RETRIABLE_TRANSPORT_NEEDLES: [&[u8]; 8] = [
    b"timed out",
    b"timeout",
    b"connection reset",
    b"connection aborted",
    b"broken pipe",
    b"connection refused",
    b"unexpected eof",
    b"connection closed",
];

const FAST_RETRY_NEEDLES: [&[u8]; 4] = [
    b"connection reset",
    b"connection aborted",
    b"broken pipe",
    b"unexpected eof",
];

/// Retry rules for the request that opens a stream.
///
/// Only the initial request is retried. Once response bytes have been handed
/// to a decoder nothing is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    #[inline]
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    #[inline]
    #[must_use]
    pub fn should_retry_status(status: http::StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 503 | 529)
    }

    #[inline]
    #[must_use]
    pub fn should_retry_transport(message: &str) -> bool {
        contains_any(message, &RETRIABLE_TRANSPORT_NEEDLES)
    }

    /// Delay before retrying a retriable status: `Retry-After` when present,
    /// exponential backoff otherwise.
    #[must_use]
    pub fn status_delay(headers: &http::HeaderMap, attempt: u32) -> Duration {
        parse_retry_after(headers).unwrap_or_else(|| backoff_delay(attempt))
    }

    /// Delay before retrying a transport failure. Dropped connections retry
    /// immediately once.
    #[must_use]
    pub fn transport_delay(message: &str, attempt: u32) -> Duration {
        if contains_any(message, &FAST_RETRY_NEEDLES) {
            return if attempt == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(RETRY_TRANSPORT_FAST_SECOND_MS)
            };
        }
        backoff_delay(attempt)
    }
}

#[inline]
fn backoff_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.min(10);
    Duration::from_millis(
        RETRY_BACKOFF_BASE_MS
            .saturating_mul(multiplier)
            .min(RETRY_BACKOFF_MAX_MS),
    )
}

fn parse_retry_after(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds.min(RETRY_AFTER_MAX_SECS)));
    }
    let target = httpdate::parse_http_date(raw).ok()?;
    let delay = target.duration_since(SystemTime::now()).unwrap_or_default();
    Some(delay.min(Duration::from_secs(RETRY_AFTER_MAX_SECS)))
}

fn contains_any(message: &str, needles: &[&[u8]]) -> bool {
    let haystack = message.as_bytes();
    needles.iter().any(|needle| {
        haystack.len() >= needle.len()
            && haystack
                .windows(needle.len())
                .any(|window| window.eq_ignore_ascii_case(needle))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_statuses() {
        assert!(RetryPolicy::should_retry_status(http::StatusCode::TOO_MANY_REQUESTS));
        assert!(RetryPolicy::should_retry_status(http::StatusCode::SERVICE_UNAVAILABLE));
        assert!(RetryPolicy::should_retry_status(
            http::StatusCode::from_u16(529).unwrap()
        ));
        assert!(!RetryPolicy::should_retry_status(http::StatusCode::UNAUTHORIZED));
        assert!(!RetryPolicy::should_retry_status(http::StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::new(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert!(!RetryPolicy::new(0).allows(0));
    }

    #[test]
    fn test_retry_after_seconds_is_capped() {
        let mut headers = http::HeaderMap::new();
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("5"));
        assert_eq!(RetryPolicy::status_delay(&headers, 0), Duration::from_secs(5));
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("3600"));
        assert_eq!(
            RetryPolicy::status_delay(&headers, 0),
            Duration::from_secs(RETRY_AFTER_MAX_SECS)
        );
    }

    #[test]
    fn test_retry_after_http_date() {
        let target = SystemTime::now() + Duration::from_secs(2);
        let mut headers = http::HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            http::HeaderValue::from_str(&httpdate::fmt_http_date(target)).unwrap(),
        );
        assert!(RetryPolicy::status_delay(&headers, 0) <= Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_without_retry_after() {
        let headers = http::HeaderMap::new();
        assert_eq!(RetryPolicy::status_delay(&headers, 0), Duration::from_millis(100));
        assert_eq!(RetryPolicy::status_delay(&headers, 1), Duration::from_millis(200));
        assert_eq!(RetryPolicy::status_delay(&headers, 9), Duration::from_millis(1_000));
    }

    #[test]
    fn test_transport_messages() {
        assert!(RetryPolicy::should_retry_transport("error sending request: Connection reset by peer"));
        assert!(RetryPolicy::should_retry_transport("operation timed out"));
        assert!(!RetryPolicy::should_retry_transport("invalid certificate"));
        assert_eq!(
            RetryPolicy::transport_delay("connection reset by peer", 0),
            Duration::ZERO
        );
        assert_eq!(
            RetryPolicy::transport_delay("unexpected EOF", 1),
            Duration::from_millis(RETRY_TRANSPORT_FAST_SECOND_MS)
        );
        assert_eq!(
            RetryPolicy::transport_delay("operation timed out", 0),
            backoff_delay(0)
        );
    }
}
