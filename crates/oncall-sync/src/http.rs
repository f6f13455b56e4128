//! Shared HTTP plumbing for the API clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use tracing::warn;

use crate::error::{ApiError, ConfigError};

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Build a `reqwest` client with default headers and a per-request timeout.
pub(crate) fn build_client(
    headers: HeaderMap,
    timeout: Duration,
) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Invalid {
            name: "HTTP client",
            reason: e.to_string(),
        })
}

/// Turn a non-success response into an [`ApiError`].
pub(crate) async fn ensure_success(
    service: &'static str,
    response: Response,
) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        warn!(service, retry_after_secs, "Rate limited");

        return Err(ApiError::RateLimited {
            service,
            retry_after_secs,
        });
    }

    let body = response.text().await.unwrap_or_default();

    warn!(service, status = %status, body = %body, "API request failed");

    Err(ApiError::Status {
        service,
        status,
        body,
    })
}
