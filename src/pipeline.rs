//! The request pipeline shared by every call the client makes.
//!
//! A logical call is dispatched, its failure (if any) normalized into
//! [`MeridianError`], and the retry policy consulted for another attempt.
//! Retry state is one counter local to [`execute`], so a call never grows the
//! stack with its retries and concurrent calls share nothing. Both suspension
//! points, the transport await and the backoff sleep, race the caller's
//! cancellation token when one is attached; cancellation is terminal and is
//! never offered to the retry policy.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tokio::time::sleep;

use crate::config::ClientConfig;
use crate::error::{ErrorKind, MeridianError};
use crate::request::{ApiRequest, ApiResponse};
use crate::Result;

/// Runs one logical call to completion under the configured retry policy.
pub(crate) async fn execute(
    http: &reqwest::Client,
    config: &ClientConfig,
    request: &ApiRequest,
) -> Result<ApiResponse> {
    if request.cancel.as_ref().is_some_and(|token| token.is_cancelled()) {
        return Err(MeridianError::cancelled());
    }

    let retry = config.retry();
    let mut retries = 0u32;
    loop {
        if config.log_requests() {
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                attempt = retries + 1,
                "dispatching request"
            );
        }

        let error = match dispatch(http, config, request).await {
            Ok(response) => {
                if config.log_requests() {
                    tracing::debug!(
                        path = %request.path,
                        status = response.status,
                        attempt = retries + 1,
                        "request succeeded"
                    );
                }
                return Ok(response);
            }
            Err(error) => error,
        };

        if error.kind == ErrorKind::Cancelled {
            return Err(error);
        }

        if !retry.should_retry(&error, retries) {
            if config.log_requests() {
                tracing::warn!(
                    path = %request.path,
                    kind = %error.kind,
                    status = ?error.status,
                    attempt = retries + 1,
                    "request failed"
                );
            }
            return Err(error);
        }

        let delay = retry.delay_for(retries, &error);
        if config.log_requests() {
            tracing::debug!(
                path = %request.path,
                kind = %error.kind,
                attempt = retries + 1,
                delay = ?delay,
                "retrying after failure"
            );
        }

        let pause = sleep(delay);
        match &request.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(MeridianError::cancelled()),
                _ = pause => {}
            },
            None => pause.await,
        }

        retries += 1;
    }
}

/// Performs a single dispatch and normalizes its outcome.
///
/// A response with status below 400 is the only success; received failure
/// statuses and transport errors both come back as [`MeridianError`]. The
/// connectivity probe calls this directly to bypass the retry loop.
pub(crate) async fn dispatch(
    http: &reqwest::Client,
    config: &ClientConfig,
    request: &ApiRequest,
) -> Result<ApiResponse> {
    let url = config.endpoint(&request.path);
    let headers = merged_headers(config, request)?;
    let timeout = request.timeout.unwrap_or(config.timeout());

    let mut builder = http
        .request(request.method.clone(), url)
        .headers(headers)
        .timeout(timeout);
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let attempt = async {
        let response = builder.send().await.map_err(MeridianError::from_transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(MeridianError::from_transport)?;
        if status.as_u16() < 400 {
            Ok(ApiResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(MeridianError::from_response(status, &headers, body))
        }
    };

    match &request.cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(MeridianError::cancelled()),
            outcome = attempt => outcome,
        },
        None => attempt.await,
    }
}

/// Builds the effective header set for one dispatch.
///
/// Precedence, lowest to highest: configured defaults, the authorization
/// derived from the API key, per-call overrides.
fn merged_headers(config: &ClientConfig, request: &ApiRequest) -> Result<HeaderMap> {
    let mut headers = config.default_headers().clone();

    if let Some(authorization) = config.authorization() {
        let value = HeaderValue::from_str(authorization).map_err(|err| {
            MeridianError::unknown(format!("invalid authorization value: {err}"))
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    for (name, value) in &request.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| MeridianError::unknown(format!("invalid header '{name}': {err}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|err| MeridianError::unknown(format!("invalid header '{name}': {err}")))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}
