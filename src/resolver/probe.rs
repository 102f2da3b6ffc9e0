//! Lightweight existence checks for guessed or cached image URLs.

use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};

use super::ResolveError;
use super::http_client::map_send_error;

/// Imgur redirects deleted or unknown images to this placeholder.
const REMOVED_IMAGE_SUFFIX: &str = "/removed.png";

/// Issues HEAD requests (falling back to a one-byte ranged GET) to confirm an
/// image URL is reachable.
#[derive(Debug, Clone)]
pub struct ExistenceProbe {
    client: Client,
}

impl ExistenceProbe {
    /// Creates a probe on top of an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Confirms `url` answers 2xx with an image-compatible content type.
    ///
    /// # Errors
    ///
    /// Returns `ProbeFailed` for non-2xx answers, HTML bodies, or redirects to
    /// a provider's "removed" placeholder, and `UpstreamTimeout`/`Network`
    /// for transport failures.
    #[instrument(skip(self))]
    pub async fn check(&self, url: &str) -> Result<(), ResolveError> {
        let mut response = self.send(self.client.head(url), url).await?;
        if matches!(
            response.status(),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            debug!("HEAD not supported, retrying probe with ranged GET");
            response = self
                .send(self.client.get(url).header(RANGE, "bytes=0-0"), url)
                .await?;
        }
        evaluate(url, &response)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Response, ResolveError> {
        request
            .send()
            .await
            .map_err(|error| map_send_error("probe", url, &error))
    }
}

fn evaluate(url: &str, response: &Response) -> Result<(), ResolveError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ResolveError::probe_failed(
            url,
            format!("HTTP {}", status.as_u16()),
        ));
    }
    if response.url().path().ends_with(REMOVED_IMAGE_SUFFIX) {
        return Err(ResolveError::probe_failed(
            url,
            "redirected to the provider's removed-image placeholder",
        ));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type.to_ascii_lowercase().starts_with("text/html") {
        return Err(ResolveError::probe_failed(
            url,
            "answered with an HTML page instead of image bytes",
        ));
    }
    Ok(())
}
