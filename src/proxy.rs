//! Streaming proxy for resolved provider downloads.
//!
//! `GET /resolve/{ref}` streams the bytes behind an opaque reference produced
//! by [`ImageLinkService`]; `GET /image-proxy?url=` relays an already-direct
//! URL the service itself handed out as a relay reference. Both answer `200`
//! with the upstream `Content-Type` and a bounded `Cache-Control`, or a `307`
//! redirect to the placeholder. Callers are `<img>` tags, so no other status is returned.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::resolver::{ResolveError, build_http_client, map_send_error, require_success};
use crate::service::ImageLinkService;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
const TOKEN_LEN: usize = 32;

/// Relays upstream image bytes under our own origin.
pub struct StreamingProxy {
    client: Client,
    service: Arc<ImageLinkService>,
    cache_control: HeaderValue,
}

#[derive(Debug, Deserialize)]
struct RelayQuery {
    url: Option<String>,
}

impl StreamingProxy {
    /// Creates a proxy with a streaming client built from the service's timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the HTTP client cannot be constructed.
    pub fn new(service: Arc<ImageLinkService>) -> Result<Self, ResolveError> {
        let client = build_http_client("proxy", service.config().stream_timeouts)?;
        Ok(Self::with_client(client, service))
    }

    /// Creates a proxy on top of an existing client.
    #[must_use]
    pub fn with_client(client: Client, service: Arc<ImageLinkService>) -> Self {
        let max_age = service.config().proxy_max_age.as_secs();
        let cache_control = HeaderValue::from_str(&format!("public, max-age={max_age}"))
            .unwrap_or_else(|_| HeaderValue::from_static("public, max-age=3600"));
        Self {
            client,
            service,
            cache_control,
        }
    }

    /// Returns the service backing this proxy.
    #[must_use]
    pub fn service(&self) -> &Arc<ImageLinkService> {
        &self.service
    }

    /// Routes for `/resolve/{ref}` and `/image-proxy`.
    pub fn routes(self: Arc<Self>) -> Router {
        let config = self.service.config();
        let resolve_route = format!("{}/{{reference}}", config.proxy_prefix.trim_end_matches('/'));
        let relay_route = config.image_proxy_path.clone();
        Router::new()
            .route(&resolve_route, get(resolve_handler))
            .route(&relay_route, get(image_proxy_handler))
            .with_state(self)
    }

    /// Streams the target behind `token`, re-resolving once if the handle went stale.
    #[instrument(skip(self))]
    pub async fn serve_reference(&self, token: &str) -> Response {
        if token.len() != TOKEN_LEN || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            warn!("Malformed proxy reference");
            return self.placeholder();
        }
        let Some(mut target) = self.service.proxy_target(token) else {
            warn!("Unknown proxy reference");
            return self.placeholder();
        };

        let mut refreshed = false;
        if target.is_expired() {
            debug!("Proxy target expired, re-resolving");
            let Some(fresh) = self.service.refresh_target(token).await else {
                warn!("Re-resolution of expired target failed");
                return self.placeholder();
            };
            target = fresh;
            refreshed = true;
        }

        match self.fetch_target(&target.upstream_url).await {
            Ok(upstream) => self.relay(upstream),
            Err(error @ ResolveError::HandleExpired { .. }) if !refreshed => {
                debug!(error = %error, "Download handle rejected, re-resolving once");
                let Some(fresh) = self.service.refresh_target(token).await else {
                    warn!(error = %error, "Re-resolution after rejected handle failed");
                    return self.placeholder();
                };
                match self.fetch_target(&fresh.upstream_url).await {
                    Ok(upstream) => self.relay(upstream),
                    Err(error) => {
                        warn!(error = %error, "Upstream fetch failed after re-resolution");
                        self.placeholder()
                    }
                }
            }
            Err(error) => {
                warn!(error = %error, "Upstream fetch failed");
                self.placeholder()
            }
        }
    }

    /// Relays an already-direct URL if the service granted it.
    #[instrument(skip(self))]
    pub async fn serve_relay(&self, url: Option<&str>) -> Response {
        let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
            warn!("Image proxy called without url");
            return self.placeholder();
        };
        if !self.service.relay_allowed(url) {
            warn!(url, "Image proxy refused URL without a relay grant");
            return self.placeholder();
        }
        match self.fetch(url).await {
            Ok(upstream) => self.relay(upstream),
            Err(error) => {
                warn!(error = %error, "Relayed fetch failed");
                self.placeholder()
            }
        }
    }

    /// Fetches a download handle; rejections meaning the handle went stale
    /// surface as [`ResolveError::HandleExpired`].
    async fn fetch_target(&self, url: &str) -> Result<reqwest::Response, ResolveError> {
        self.fetch(url).await.map_err(ResolveError::into_handle_expired)
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, ResolveError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| map_send_error("proxy", url, &error))?;
        let response = require_success("proxy", url, response).map_err(|(error, _)| error)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);
        if content_type
            .as_deref()
            .is_some_and(|value| value.starts_with("text/html"))
        {
            return Err(ResolveError::not_an_image(content_type.as_deref()));
        }
        Ok(response)
    }

    fn relay(&self, upstream: reqwest::Response) -> Response {
        let content_type = upstream
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok())
            .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
        let content_length = upstream
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok());

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(CACHE_CONTROL, self.cache_control.clone());
        if let Some(length) = content_length {
            headers.insert(CONTENT_LENGTH, length);
        }
        response
    }

    fn placeholder(&self) -> Response {
        Redirect::temporary(self.service.placeholder()).into_response()
    }
}

impl std::fmt::Debug for StreamingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingProxy")
            .field("cache_control", &self.cache_control)
            .finish_non_exhaustive()
    }
}

async fn resolve_handler(
    State(proxy): State<Arc<StreamingProxy>>,
    Path(reference): Path<String>,
) -> Response {
    proxy.serve_reference(&reference).await
}

async fn image_proxy_handler(
    State(proxy): State<Arc<StreamingProxy>>,
    Query(query): Query<RelayQuery>,
) -> Response {
    proxy.serve_relay(query.url.as_deref()).await
}
