use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    config::{self, ClientConfig},
    pipeline, ApiRequest, ApiResponse, ConfigError, Result, RetryPolicy,
};

/// Timeout applied when the builder is not given one.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Liveness path probed by [`MeridianClient::ping`].
const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
/// Asynchronous client for the Meridian platform API.
///
/// Every call goes through one pipeline: dispatch, error normalization and
/// automatic retry with exponential backoff. Cloning is cheap; clones share
/// the connection pool and observe the same configuration updates.
pub struct MeridianClient {
    http: reqwest::Client,
    config: Arc<ArcSwap<ClientConfig>>,
}

impl fmt::Debug for MeridianClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeridianClient")
            .field("config", &**self.config.load())
            .finish()
    }
}

impl MeridianClient {
    /// Creates a client with the default timeout and retry policy.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use meridian_http::MeridianClient;
    ///
    /// let client = MeridianClient::new("https://api.meridian.dev")?;
    /// # Ok::<(), meridian_http::ConfigError>(())
    /// ```
    pub fn new(base_url: impl Into<String>) -> std::result::Result<Self, ConfigError> {
        Self::builder(base_url).build()
    }

    /// Starts a builder anchored at `base_url`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use meridian_http::{MeridianClient, RetryPolicy};
    ///
    /// let client = MeridianClient::builder("https://api.meridian.dev")
    ///     .api_key("mk_live_abc123")
    ///     .timeout(Duration::from_secs(30))
    ///     .retry_policy(RetryPolicy::new(5, 500, 30_000, 2.0)?)
    ///     .build()?;
    /// # Ok::<(), meridian_http::ConfigError>(())
    /// ```
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            headers: Vec::new(),
            api_key: None,
            log_requests: false,
            retry: RetryPolicy::default(),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `MERIDIAN_BASE_URL` — platform API base address (required)
    /// - `MERIDIAN_API_KEY` — access key, Bearer prefix optional
    ///
    /// Returns an error if the base address is missing, empty, or fails
    /// validation. A missing or empty API key yields an unauthenticated
    /// client.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let base_url = std::env::var("MERIDIAN_BASE_URL")
            .map_err(|_| ConfigError::MissingEnv("MERIDIAN_BASE_URL"))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::MissingEnv("MERIDIAN_BASE_URL"));
        }
        let mut builder = Self::builder(base_url);
        if let Ok(key) = std::env::var("MERIDIAN_API_KEY") {
            if !key.trim().is_empty() {
                builder = builder.api_key(key);
            }
        }
        builder.build()
    }

    /// Replaces the API key used for the `Authorization` header.
    ///
    /// Calls already in flight keep the snapshot they loaded; the new key
    /// applies to every call that starts afterwards.
    pub fn set_api_key(&self, key: impl AsRef<str>) -> std::result::Result<(), ConfigError> {
        let authorization =
            config::validate_authorization(config::normalize_bearer_authorization(key.as_ref()))?;
        self.config
            .rcu(|current| current.with_authorization(Some(authorization.clone())));
        Ok(())
    }

    /// Removes the API key; later calls go out unauthenticated.
    pub fn clear_api_key(&self) {
        self.config.rcu(|current| current.with_authorization(None));
    }

    /// Replaces the default header set sent on every request.
    pub fn set_default_headers(
        &self,
        headers: &[(String, String)],
    ) -> std::result::Result<(), ConfigError> {
        let map = config::build_header_map(headers)?;
        self.config
            .rcu(|current| current.with_default_headers(map.clone()));
        Ok(())
    }

    /// Replaces the retry policy for every call that starts afterwards.
    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        self.config.rcu(|current| current.with_retry(policy.clone()));
    }

    /// Base address the client was configured with.
    pub fn base_url(&self) -> String {
        self.config.load().base_url().to_string()
    }

    /// Timeout applied to calls without a per-call override.
    pub fn timeout(&self) -> Duration {
        self.config.load().timeout()
    }

    /// Snapshot of the current retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.load().retry().clone()
    }

    /// Configuration snapshot the next call would observe.
    ///
    /// Setters replace the snapshot rather than mutating it, so a snapshot
    /// held across a setter keeps the values it was loaded with.
    pub fn config(&self) -> Arc<ClientConfig> {
        self.config.load_full()
    }

    /// Executes one logical call through the retry pipeline.
    ///
    /// This is the general entry point; the verb helpers below build the
    /// descriptor and decode the response for the common cases.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let config = self.config.load_full();
        pipeline::execute(&self.http, &config, &request).await
    }

    /// GET `path` and decode the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// POST `body` as JSON to `path` and decode the response.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    /// PUT `body` as JSON to `path` and decode the response.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    /// PATCH `path` with `body` as JSON and decode the response.
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.send(ApiRequest::patch(path).json(body)?).await?.json()
    }

    /// DELETE `path`.
    ///
    /// Returns the raw response; deletion endpoints commonly answer with an
    /// empty body, which has no JSON decoding.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Probes the service liveness endpoint with a single dispatch.
    ///
    /// Returns `true` iff a response with status below 400 arrived. The probe
    /// never retries and maps every failure, transport included, to `false`;
    /// it is safe to call repeatedly from health-check loops.
    pub async fn ping(&self) -> bool {
        let config = self.config.load_full();
        let request = ApiRequest::get(HEALTH_PATH);
        pipeline::dispatch(&self.http, &config, &request).await.is_ok()
    }
}

/// Builder for [`MeridianClient`].
///
/// Values are collected unchecked and validated together in
/// [`ClientBuilder::build`], so a bad base URL and a bad timeout report
/// whichever is checked first rather than panicking later mid-request.
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    base_url: String,
    timeout_ms: u64,
    headers: Vec<(String, String)>,
    api_key: Option<String>,
    log_requests: bool,
    retry: RetryPolicy,
}

impl ClientBuilder {
    /// Request timeout applied when a call carries no override.
    ///
    /// Accepted range is 1 to 300 seconds, checked in [`ClientBuilder::build`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// API key sent as a bearer `Authorization` header on every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Adds a default header sent on every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the default retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Enables per-request `tracing` events from the pipeline.
    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Validates the collected configuration and builds the client.
    ///
    /// Fails when the base URL is not an absolute http(s) URL, the timeout
    /// falls outside the accepted range, or a header does not pass HTTP
    /// validation.
    pub fn build(self) -> std::result::Result<MeridianClient, ConfigError> {
        let config = ClientConfig::new(
            &self.base_url,
            self.timeout_ms,
            &self.headers,
            self.api_key.as_deref(),
            self.log_requests,
            self.retry,
        )?;
        Ok(MeridianClient {
            http: reqwest::Client::new(),
            config: Arc::new(ArcSwap::from_pointee(config)),
        })
    }
}
