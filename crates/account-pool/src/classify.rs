//! Upstream error classification
//!
//! The pool applies a different backoff per class, so the caller maps each
//! upstream failure to exactly one `ErrorClass` before reporting it. Only
//! `Server` and `Unknown` count toward the consecutive-error cutoff.

use serde::Serialize;

/// Closed classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rate limit or subscription quota exhausted
    Quota,
    /// Credential rejected; account needs a token refresh
    Auth,
    /// Connection failure or timeout before a usable response
    Network,
    /// Upstream 5xx
    Server,
    Unknown,
}

impl ErrorClass {
    /// Metric/log label.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClass::Quota => "quota",
            ErrorClass::Auth => "auth",
            ErrorClass::Network => "network",
            ErrorClass::Server => "server",
            ErrorClass::Unknown => "unknown",
        }
    }

    /// Whether this class advances the consecutive-error counter.
    pub fn counts_toward_limit(&self) -> bool {
        matches!(self, ErrorClass::Server | ErrorClass::Unknown)
    }
}

/// Quota exhaustion phrases seen in non-429 error bodies.
const QUOTA_PATTERNS: &[&str] = &[
    "quota",
    "resource_exhausted",
    "rate limit",
    "usage limit",
    "rolling window",
];

fn mentions_quota(body: &str) -> bool {
    let lower = body.to_lowercase();
    QUOTA_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Classify an upstream error by HTTP status and response body.
///
/// 429 is always `Quota`; 401/403 are `Auth`; 408/504 are `Network` (the
/// upstream or a hop timed out); other 5xx are `Server`. A 400 whose body
/// reports quota exhaustion is `Quota`. Everything else is `Unknown`.
pub fn classify_status(status: u16, body: &str) -> ErrorClass {
    match status {
        429 => ErrorClass::Quota,
        401 | 403 => ErrorClass::Auth,
        408 | 504 => ErrorClass::Network,
        500..=599 => ErrorClass::Server,
        400 if mentions_quota(body) => ErrorClass::Quota,
        _ => ErrorClass::Unknown,
    }
}

/// Classify a failure that never produced an HTTP response.
///
/// Connect errors and timeouts are `Network`; anything else (body decode,
/// protocol errors) is `Unknown`.
pub fn classify_transport(is_connect_or_timeout: bool) -> ErrorClass {
    if is_connect_or_timeout {
        ErrorClass::Network
    } else {
        ErrorClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_quota_regardless_of_body() {
        assert_eq!(classify_status(429, ""), ErrorClass::Quota);
        assert_eq!(
            classify_status(429, r#"{"error":{"message":"slow down"}}"#),
            ErrorClass::Quota
        );
    }

    #[test]
    fn status_401_and_403_are_auth() {
        assert_eq!(classify_status(401, "unauthorized"), ErrorClass::Auth);
        assert_eq!(classify_status(403, "forbidden"), ErrorClass::Auth);
    }

    #[test]
    fn timeouts_are_network() {
        assert_eq!(classify_status(408, "request timeout"), ErrorClass::Network);
        assert_eq!(classify_status(504, "gateway timeout"), ErrorClass::Network);
    }

    #[test]
    fn other_5xx_are_server() {
        for status in [500, 502, 503, 529] {
            assert_eq!(classify_status(status, ""), ErrorClass::Server, "status {status}");
        }
    }

    #[test]
    fn bad_request_mentioning_quota_is_quota() {
        let body = r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"Quota exceeded"}}"#;
        assert_eq!(classify_status(400, body), ErrorClass::Quota);
    }

    #[test]
    fn plain_bad_request_is_unknown() {
        assert_eq!(
            classify_status(400, r#"{"error":{"message":"invalid model"}}"#),
            ErrorClass::Unknown
        );
        assert_eq!(classify_status(418, "i'm a teapot"), ErrorClass::Unknown);
    }

    #[test]
    fn transport_failures() {
        assert_eq!(classify_transport(true), ErrorClass::Network);
        assert_eq!(classify_transport(false), ErrorClass::Unknown);
    }

    #[test]
    fn only_server_and_unknown_count() {
        assert!(ErrorClass::Server.counts_toward_limit());
        assert!(ErrorClass::Unknown.counts_toward_limit());
        assert!(!ErrorClass::Quota.counts_toward_limit());
        assert!(!ErrorClass::Auth.counts_toward_limit());
        assert!(!ErrorClass::Network.counts_toward_limit());
    }
}
