use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::MeridianError;
use crate::Result;

/// Describes one logical call into the request pipeline.
///
/// A descriptor carries everything the pipeline needs to dispatch and, if
/// necessary, re-dispatch the call: method, path, query parameters, per-call
/// header and timeout overrides, an optional JSON body, and an optional
/// cancellation token. Descriptors are plain data; nothing is sent until the
/// client executes them.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl ApiRequest {
    /// Starts a request with an explicit method.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            cancel: None,
        }
    }

    /// GET request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request for `path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT request for `path`.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// PATCH request for `path`.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// DELETE request for `path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends one query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds a per-call header; it wins over a default header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serializes `body` as the JSON payload of this request.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| MeridianError::unknown(format!("unserializable request body: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Overrides the configured timeout for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a token the pipeline observes at every suspension point.
    ///
    /// Cancelling the token ends the logical call with a terminal
    /// [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled) error, including
    /// mid-backoff between attempts.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Successful pipeline outcome: a response whose status is below 400.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
}

impl ApiResponse {
    /// HTTP status of the final attempt.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Raw response body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decodes the body as JSON into the caller's type.
    ///
    /// Payload shape is the caller's contract with the endpoint; a body that
    /// does not decode is reported as an `Unknown` error.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|err| MeridianError::unknown(format!("undecodable response body: {err}")))
    }
}
