//! Rate-limit response headers.

use chrono::DateTime;
use reqwest::header::{CONTENT_TYPE, DATE, HeaderMap, RETRY_AFTER};

/// Bucket capacity.
pub const LIMIT: &str = "x-ratelimit-limit";
/// Tokens left in the current window.
pub const REMAINING: &str = "x-ratelimit-remaining";
/// Window end as Unix seconds.
pub const RESET: &str = "x-ratelimit-reset";
/// Seconds until the window ends.
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Marks a limit as global rather than per-route.
pub const GLOBAL: &str = "x-ratelimit-global";

/// Rate-limit information carried by one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// `x-ratelimit-limit`
    pub limit: Option<i64>,
    /// `x-ratelimit-remaining`; an unparsable value reads as `0`
    pub remaining: Option<i64>,
    /// `x-ratelimit-reset`, converted to Unix milliseconds
    pub reset_ms: Option<i64>,
    /// `retry-after`, else `x-ratelimit-reset-after`, in milliseconds
    pub retry_after_ms: Option<i64>,
    /// `x-ratelimit-global`
    pub global: bool,
    /// `date`, as Unix milliseconds
    pub server_date_ms: Option<i64>,
    /// `content-type`
    pub content_type: Option<String>,
}

impl RateLimitHeaders {
    /// Extract rate-limit information from response headers.
    pub fn parse(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        };
        let seconds_to_ms = |name: &str| {
            text(name)
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|secs| secs.is_finite())
                .map(|secs| (secs * 1000.0).ceil() as i64)
        };

        let retry_after_ms =
            seconds_to_ms(RETRY_AFTER.as_str()).or_else(|| seconds_to_ms(RESET_AFTER));

        Self {
            limit: text(LIMIT).and_then(|value| value.parse().ok()),
            remaining: text(REMAINING).map(|value| value.parse().unwrap_or(0)),
            reset_ms: text(RESET)
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|secs| secs.is_finite())
                .map(|secs| (secs * 1000.0).round() as i64),
            retry_after_ms,
            global: text(GLOBAL).is_some_and(|value| !value.is_empty() && value != "false"),
            server_date_ms: text(DATE.as_str())
                .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
                .map(|date| date.timestamp_millis()),
            content_type: text(CONTENT_TYPE.as_str()).map(str::to_string),
        }
    }

    /// Whether either per-bucket accounting header was absent.
    pub fn missing_bucket_headers(&self) -> bool {
        self.limit.is_none() || self.remaining.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_full_header_set() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (LIMIT, "5"),
            (REMAINING, "4"),
            (RESET, "1470173023.123"),
            (RESET_AFTER, "1.5"),
            ("date", "Tue, 02 Aug 2016 21:23:42 GMT"),
            ("content-type", "application/json"),
        ]));

        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.remaining, Some(4));
        assert_eq!(parsed.reset_ms, Some(1_470_173_023_123));
        assert_eq!(parsed.retry_after_ms, Some(1500));
        assert_eq!(parsed.server_date_ms, Some(1_470_173_022_000));
        assert!(!parsed.global);
        assert!(!parsed.missing_bucket_headers());
    }

    #[test]
    fn test_retry_after_wins_over_reset_after() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            ("retry-after", "2"),
            (RESET_AFTER, "9"),
            (GLOBAL, "true"),
        ]));
        assert_eq!(parsed.retry_after_ms, Some(2000));
        assert!(parsed.global);
    }

    #[test]
    fn test_malformed_remaining_reads_as_zero() {
        let parsed = RateLimitHeaders::parse(&headers(&[(REMAINING, "lots")]));
        assert_eq!(parsed.remaining, Some(0));
        assert_eq!(parsed.limit, None);
        assert!(parsed.missing_bucket_headers());
    }

    #[test]
    fn test_out_of_range_values_saturate() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            ("retry-after", "1e300"),
            (RESET, "-1e300"),
        ]));
        assert_eq!(parsed.retry_after_ms, Some(i64::MAX));
        assert_eq!(parsed.reset_ms, Some(i64::MIN));
    }

    #[test]
    fn test_empty_headers() {
        assert_eq!(RateLimitHeaders::parse(&HeaderMap::new()), RateLimitHeaders::default());
    }
}
