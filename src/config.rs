use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Smallest accepted request timeout.
pub(crate) const MIN_TIMEOUT_MS: u64 = 1_000;
/// Largest accepted request timeout.
pub(crate) const MAX_TIMEOUT_MS: u64 = 300_000;

/// Immutable, validated configuration snapshot.
///
/// The client loads one snapshot per logical call and the setters replace the
/// whole snapshot atomically, so a call in flight never observes a half
/// applied update.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: Url,
    timeout: Duration,
    default_headers: HeaderMap,
    authorization: Option<String>,
    log_requests: bool,
    retry: RetryPolicy,
}

impl ClientConfig {
    pub(crate) fn new(
        base_url: &str,
        timeout_ms: u64,
        headers: &[(String, String)],
        api_key: Option<&str>,
        log_requests: bool,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(base_url)?;
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
            return Err(ConfigError::TimeoutOutOfRange(timeout_ms));
        }
        let default_headers = build_header_map(headers)?;
        let authorization = match api_key {
            Some(key) => Some(validate_authorization(normalize_bearer_authorization(key))?),
            None => None,
        };
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(timeout_ms),
            default_headers,
            authorization,
            log_requests,
            retry,
        })
    }

    /// Base address all request paths are joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Timeout applied to calls without a per-call override.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Headers sent on every request unless overridden per call.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Whether the pipeline emits per-request log events.
    pub fn log_requests(&self) -> bool {
        self.log_requests
    }

    /// Retry policy governing the pipeline.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// Joins a request path onto the base address.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub(crate) fn with_authorization(&self, authorization: Option<String>) -> Self {
        let mut next = self.clone();
        next.authorization = authorization;
        next
    }

    pub(crate) fn with_default_headers(&self, default_headers: HeaderMap) -> Self {
        let mut next = self.clone();
        next.default_headers = default_headers;
        next
    }

    pub(crate) fn with_retry(&self, retry: RetryPolicy) -> Self {
        let mut next = self.clone();
        next.retry = retry;
        next
    }
}

impl fmt::Debug for ClientConfig {
    // The authorization value embeds the API key; never print it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("default_headers", &self.default_headers)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("log_requests", &self.log_requests)
            .field("retry", &self.retry)
            .finish()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| ConfigError::InvalidBaseUrl(raw.to_owned(), err))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_owned())),
    }
}

/// Converts header pairs into a validated `HeaderMap`.
pub(crate) fn build_header_map(pairs: &[(String, String)]) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|err| ConfigError::InvalidHeader {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|err| ConfigError::InvalidHeader {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Ensures the API key passed in can be sent as an `Authorization` header.
pub(crate) fn validate_authorization(authorization: String) -> Result<String, ConfigError> {
    HeaderValue::from_str(&authorization).map_err(|err| ConfigError::InvalidHeader {
        name: "authorization".to_owned(),
        reason: err.to_string(),
    })?;
    Ok(authorization)
}

/// Normalizes an API key into an `Authorization` header value with a single
/// `Bearer` prefix, tolerating keys supplied with the prefix already present.
pub(crate) fn normalize_bearer_authorization(key: &str) -> String {
    let trimmed = key.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
