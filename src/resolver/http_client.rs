//! Shared HTTP client construction and response policy for resolvers.
//!
//! Every provider call goes through the same client policy (timeouts,
//! user-agent, compression) and the same error mapping, so a failure is
//! converted to a [`ResolveError`] in exactly one place per call.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use tracing::debug;

use crate::user_agent;

use super::ResolveError;

/// Default connect timeout for metadata/API calls.
pub const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for metadata/API calls.
pub const API_READ_TIMEOUT: Duration = Duration::from_secs(8);
/// Default connect timeout for final byte streaming.
pub const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout for final byte streaming.
pub const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Connect and total-request timeouts for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Whole-request timeout.
    pub read: Duration,
}

impl HttpTimeouts {
    /// Defaults for provider metadata APIs and existence probes.
    #[must_use]
    pub fn api() -> Self {
        Self {
            connect: API_CONNECT_TIMEOUT,
            read: API_READ_TIMEOUT,
        }
    }

    /// Defaults for the streaming proxy's final fetch.
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            connect: STREAM_CONNECT_TIMEOUT,
            read: STREAM_READ_TIMEOUT,
        }
    }
}

/// Builds an HTTP client using shared project policy.
///
/// `component` is used only for error messages.
///
/// # Errors
///
/// Returns [`ResolveError`] when client construction fails.
pub fn build_http_client(component: &str, timeouts: HttpTimeouts) -> Result<Client, ResolveError> {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .user_agent(user_agent::default_user_agent())
        .gzip(true)
        .build()
        .map_err(|error| {
            ResolveError::network(component, "-", format!("HTTP client construction failed: {error}"))
        })
}

/// Converts a transport-level reqwest error into a [`ResolveError`].
#[must_use]
pub fn map_send_error(provider: &str, url: &str, error: &reqwest::Error) -> ResolveError {
    if error.is_timeout() {
        ResolveError::timeout(provider, url)
    } else {
        ResolveError::network(provider, url, error.to_string())
    }
}

/// Passes 2xx responses through; turns anything else into `UpstreamRejected`.
///
/// Returns the parsed Retry-After delay alongside the error for 429 answers so
/// the caller can feed it to the rate limiter.
///
/// # Errors
///
/// Returns the rejection and an optional Retry-After delay for non-2xx statuses.
pub fn require_success(
    provider: &str,
    url: &str,
    response: Response,
) -> Result<Response, (ResolveError, Option<Duration>)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(crate::rate_limiter::parse_retry_after);
    debug!(
        provider,
        url,
        status = status.as_u16(),
        retry_after_ms = retry_after.map(|d| d.as_millis()),
        "upstream rejected request"
    );
    Err((ResolveError::rejected(provider, url, status.as_u16()), retry_after))
}

/// Decodes a JSON body, mapping transport and decoding failures.
///
/// # Errors
///
/// Returns `UpstreamTimeout`/`Network` when the body cannot be read and
/// `MalformedResponse` when it is not the expected JSON.
pub async fn read_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    url: &str,
    response: Response,
) -> Result<T, ResolveError> {
    let body = response
        .bytes()
        .await
        .map_err(|error| map_send_error(provider, url, &error))?;
    serde_json::from_slice(&body)
        .map_err(|error| ResolveError::malformed(provider, format!("invalid JSON body: {error}")))
}
