use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::config::{MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};

/// Failure classification for everything the request pipeline can observe.
///
/// The set is closed: callers branch on the kind instead of re-parsing
/// status codes, and the normalizer maps anything it cannot classify to
/// [`ErrorKind::Unknown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection-level failure with no usable response (refusal, DNS, reset).
    Network,
    /// The attempt exceeded its deadline.
    Timeout,
    /// HTTP 429 from the server.
    RateLimited,
    /// HTTP 4xx other than 429; the request itself is at fault.
    ClientError,
    /// HTTP 5xx.
    ServerError,
    /// The caller cancelled the logical call.
    Cancelled,
    /// Anything the normalizer could not classify.
    Unknown,
}

impl ErrorKind {
    /// Whether the default retry predicate treats this kind as transient.
    ///
    /// Client-caused and unclassifiable failures are not transient; retrying
    /// a malformed request cannot succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServerError | Self::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate limited",
            Self::ClientError => "client error",
            Self::ServerError => "server error",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Normalized error returned by this crate.
///
/// Every transport or server failure is converted into this one shape before
/// it reaches application code; raw `reqwest` errors never cross the crate
/// boundary. An instance describes exactly one failed attempt and is never
/// mutated afterwards.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct MeridianError {
    /// Failure classification the caller can branch on.
    pub kind: ErrorKind,
    /// HTTP status code, when a response was received.
    pub status: Option<u16>,
    /// Server-stated wait before retrying, parsed from `Retry-After` on 429.
    pub retry_after: Option<Duration>,
    /// Human-readable description of the failure.
    pub message: String,
    /// Raw response body, when one was received.
    pub body: Option<String>,
    /// When the failed attempt was observed.
    pub timestamp: DateTime<Utc>,
}

impl MeridianError {
    fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            status: None,
            retry_after: None,
            message,
            body: None,
            timestamp: Utc::now(),
        }
    }

    /// Normalizes a `reqwest` failure where no usable response arrived.
    ///
    /// Build failures are the caller's bug, not the network's, and map to
    /// [`ErrorKind::Unknown`] so the default predicate never retries them.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::new(ErrorKind::Unknown, format!("invalid request: {err}"))
        } else if err.is_timeout() {
            Self::new(ErrorKind::Timeout, format!("request timed out: {err}"))
        } else {
            Self::new(ErrorKind::Network, format!("connection failed: {err}"))
        }
    }

    /// Normalizes a received response with a non-success status.
    pub(crate) fn from_response(status: StatusCode, headers: &HeaderMap, body: String) -> Self {
        let kind = if status.is_server_error() {
            ErrorKind::ServerError
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            ErrorKind::RateLimited
        } else if status.is_client_error() {
            ErrorKind::ClientError
        } else {
            ErrorKind::Unknown
        };

        let code = status.as_u16();
        let message = match status.canonical_reason() {
            Some(reason) => format!("{kind} (status {code} {reason})"),
            None => format!("{kind} (status {code})"),
        };

        Self {
            kind,
            status: Some(code),
            retry_after: (kind == ErrorKind::RateLimited)
                .then(|| retry_after_seconds(headers))
                .flatten(),
            message,
            body: (!body.is_empty()).then_some(body),
            timestamp: Utc::now(),
        }
    }

    /// Terminal error surfaced when the caller cancels a logical call.
    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "request cancelled by caller".to_owned())
    }

    /// Fallback for request-build and body-decode failures.
    pub(crate) fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message.into())
    }
}

/// Reads `Retry-After` as a whole number of seconds.
///
/// The HTTP-date form of the header is rare on rate-limit responses and is
/// treated as absent.
fn retry_after_seconds(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Error returned when client construction or a setter rejects its input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Base address did not parse as an absolute URL.
    #[error("invalid base URL '{0}': {1}")]
    InvalidBaseUrl(String, url::ParseError),
    /// Base address scheme is neither http nor https.
    #[error("unsupported URL scheme '{0}': expected http or https")]
    UnsupportedScheme(String),
    /// Timeout outside the accepted range.
    #[error("timeout {0} ms is outside the accepted range [{min} ms, {max} ms]", min = MIN_TIMEOUT_MS, max = MAX_TIMEOUT_MS)]
    TimeoutOutOfRange(u64),
    /// Header name or value failed HTTP validation.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    /// Retry policy parameters violate their invariants.
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
    /// Required environment variable missing or empty.
    #[error("environment variable {0} is missing or empty")]
    MissingEnv(&'static str),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use reqwest::StatusCode;

    use super::{ConfigError, ErrorKind, MeridianError};

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).expect("valid header"));
        headers
    }

    #[test]
    fn server_statuses_normalize_to_server_error() {
        for code in [500u16, 502, 503, 504] {
            let status = StatusCode::from_u16(code).expect("valid status");
            let error = MeridianError::from_response(status, &HeaderMap::new(), String::new());
            assert_eq!(error.kind, ErrorKind::ServerError, "status {code}");
            assert_eq!(error.status, Some(code));
            assert!(error.retry_after.is_none());
        }
    }

    #[test]
    fn too_many_requests_normalizes_to_rate_limited_with_wait() {
        let error = MeridianError::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("5"),
            "slow down".to_owned(),
        );
        assert_eq!(error.kind, ErrorKind::RateLimited);
        assert_eq!(error.status, Some(429));
        assert_eq!(error.retry_after, Some(Duration::from_secs(5)));
        assert_eq!(error.body.as_deref(), Some("slow down"));
    }

    #[test]
    fn unparseable_retry_after_is_absent() {
        let error = MeridianError::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("Wed, 21 Oct 2026 07:28:00 GMT"),
            String::new(),
        );
        assert_eq!(error.kind, ErrorKind::RateLimited);
        assert!(error.retry_after.is_none());
    }

    #[test]
    fn retry_after_only_populated_for_rate_limits() {
        let error = MeridianError::from_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &headers_with_retry_after("5"),
            String::new(),
        );
        assert_eq!(error.kind, ErrorKind::ServerError);
        assert!(error.retry_after.is_none());
    }

    #[test]
    fn client_statuses_normalize_to_client_error() {
        for code in [400u16, 401, 404, 422] {
            let status = StatusCode::from_u16(code).expect("valid status");
            let error = MeridianError::from_response(status, &HeaderMap::new(), String::new());
            assert_eq!(error.kind, ErrorKind::ClientError, "status {code}");
        }
    }

    #[test]
    fn message_carries_status_and_reason() {
        let error = MeridianError::from_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &HeaderMap::new(),
            String::new(),
        );
        assert_eq!(error.to_string(), "server error (status 503 Service Unavailable)");
    }

    #[test]
    fn timeout_range_message_names_both_bounds() {
        let message = ConfigError::TimeoutOutOfRange(10).to_string();
        assert_eq!(
            message,
            "timeout 10 ms is outside the accepted range [1000 ms, 300000 ms]"
        );
    }

    #[test]
    fn empty_body_is_stored_as_absent() {
        let error =
            MeridianError::from_response(StatusCode::BAD_GATEWAY, &HeaderMap::new(), String::new());
        assert!(error.body.is_none());
    }

    #[test]
    fn builder_failures_normalize_to_unknown() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .expect_err("url must not parse");
        let error = MeridianError::from_transport(err);
        assert_eq!(error.kind, ErrorKind::Unknown);
    }

    #[test]
    fn cancellation_is_its_own_kind() {
        let error = MeridianError::cancelled();
        assert_eq!(error.kind, ErrorKind::Cancelled);
        assert!(!error.kind.is_transient());
    }

    #[test]
    fn transient_kinds_match_default_retry_set() {
        assert!(ErrorKind::Network.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::ServerError.is_transient());
        assert!(ErrorKind::RateLimited.is_transient());
        assert!(!ErrorKind::ClientError.is_transient());
        assert!(!ErrorKind::Cancelled.is_transient());
        assert!(!ErrorKind::Unknown.is_transient());
    }
}
