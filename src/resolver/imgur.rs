//! Imgur resolver for album, gallery and extension-less image links.
//!
//! The album API is always tried before pattern guessing. Guessing
//! synthesizes `{image_base}/{id}.{ext}` for each of [`GUESSED_EXTENSIONS`] in
//! order and keeps the first URL the existence probe confirms.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::classify::{ClassifiedLink, LinkKind, Provider};
use crate::rate_limiter::RateLimiter;

use super::http_client::{map_send_error, read_json, require_success};
use super::{ExistenceProbe, ProviderSettings, ResolveError, ResolveMethod, ResolvedTarget, Resolver};

/// Imgur REST API base.
pub const DEFAULT_IMGUR_API_BASE: &str = "https://api.imgur.com";

/// Host serving Imgur image bytes.
pub const DEFAULT_IMGUR_IMAGE_BASE: &str = "https://i.imgur.com";

/// Extensions tried, in order, when guessing a direct image URL.
pub const GUESSED_EXTENSIONS: [&str; 4] = ["jpg", "png", "jpeg", "webp"];

const PROVIDER: Provider = Provider::Imgur;

#[derive(Debug, Deserialize)]
struct AlbumImages {
    #[serde(default)]
    data: Vec<AlbumImage>,
}

#[derive(Debug, Deserialize)]
struct AlbumImage {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    mime_type: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

impl AlbumImage {
    fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_none_or(|mime| mime.to_ascii_lowercase().starts_with("image/"))
    }
}

/// Resolver for Imgur links.
pub struct ImgurResolver {
    client: Client,
    probe: ExistenceProbe,
    limiter: Arc<RateLimiter>,
    client_id: Option<String>,
    api_base: String,
    image_base: String,
}

impl ImgurResolver {
    /// Creates a resolver using the endpoints and client id from `settings`.
    #[must_use]
    pub fn new(
        client: Client,
        probe: ExistenceProbe,
        limiter: Arc<RateLimiter>,
        settings: &ProviderSettings,
    ) -> Self {
        Self {
            client,
            probe,
            limiter,
            client_id: settings
                .imgur_client_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
            api_base: settings.imgur_api_base.trim_end_matches('/').to_string(),
            image_base: settings.imgur_image_base.trim_end_matches('/').to_string(),
        }
    }

    fn identifier<'a>(link: &'a ClassifiedLink) -> Result<&'a str, ResolveError> {
        link.identifier
            .as_deref()
            .ok_or_else(|| ResolveError::invalid_link(&link.normalized, "no Imgur identifier"))
    }

    #[instrument(skip(self, link), fields(provider = "imgur", link = %link.normalized))]
    async fn resolve_via_album_api(
        &self,
        link: &ClassifiedLink,
    ) -> Result<ResolvedTarget, ResolveError> {
        let album_id = Self::identifier(link)?;
        let Some(client_id) = &self.client_id else {
            return Err(ResolveError::missing_credential(
                PROVIDER.name(),
                "API client id",
                "IMGUR_CLIENT_ID",
            ));
        };

        let mut url = Url::parse(&self.api_base).map_err(|error| {
            ResolveError::malformed(PROVIDER.name(), format!("invalid API base: {error}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| ResolveError::malformed(PROVIDER.name(), "API base cannot hold a path"))?
            .pop_if_empty()
            .extend(["3", "album", album_id, "images"]);
        let url_text = url.to_string();

        self.limiter.acquire(PROVIDER.name()).await;
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Client-ID {client_id}"))
            .send()
            .await
            .map_err(|error| map_send_error(PROVIDER.name(), &url_text, &error))?;

        let response = match require_success(PROVIDER.name(), &url_text, response) {
            Ok(response) => response,
            Err((error, retry_after)) => {
                if let (ResolveError::UpstreamRejected { status: 429, .. }, Some(delay)) =
                    (&error, retry_after)
                {
                    self.limiter.record_rate_limit(PROVIDER.name(), delay);
                }
                return Err(error);
            }
        };
        let album: AlbumImages = read_json(PROVIDER.name(), &url_text, response).await?;

        let listed = album.data.len();
        album
            .data
            .into_iter()
            .filter(AlbumImage::is_image)
            .find_map(|image| {
                debug!(image_id = ?image.id, "Album image selected");
                image.link.filter(|link| !link.is_empty())
            })
            .map(ResolvedTarget::Absolute)
            .ok_or(ResolveError::NoImageInContainer { children: listed })
    }

    #[instrument(skip(self, link), fields(provider = "imgur", link = %link.normalized))]
    async fn resolve_by_guess(&self, link: &ClassifiedLink) -> Result<ResolvedTarget, ResolveError> {
        let id = Self::identifier(link)?;
        let mut misses = Vec::with_capacity(GUESSED_EXTENSIONS.len());
        for ext in GUESSED_EXTENSIONS {
            let candidate = format!("{}/{id}.{ext}", self.image_base);
            match self.probe.check(&candidate).await {
                Ok(()) => {
                    debug!(candidate = %candidate, "Extension guess confirmed");
                    return Ok(ResolvedTarget::Absolute(candidate));
                }
                Err(error) => {
                    debug!(candidate = %candidate, error = %error, "Extension guess missed");
                    misses.push(ext);
                }
            }
        }
        Err(ResolveError::probe_failed(
            &format!("{}/{id}", self.image_base),
            format!("no reachable extension among {}", misses.join(", ")),
        ))
    }
}

impl std::fmt::Debug for ImgurResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImgurResolver")
            .field("api_base", &self.api_base)
            .field("image_base", &self.image_base)
            .field("has_client_id", &self.client_id.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for ImgurResolver {
    fn name(&self) -> &'static str {
        PROVIDER.name()
    }

    fn kinds(&self) -> &'static [LinkKind] {
        &[LinkKind::ImgurAlbum, LinkKind::ImgurImage]
    }

    fn methods(&self, link: &ClassifiedLink) -> Vec<ResolveMethod> {
        match link.kind {
            LinkKind::ImgurAlbum => vec![ResolveMethod::AlbumApi, ResolveMethod::ExtensionGuess],
            _ => vec![ResolveMethod::ExtensionGuess],
        }
    }

    async fn attempt(
        &self,
        method: ResolveMethod,
        link: &ClassifiedLink,
    ) -> Result<ResolvedTarget, ResolveError> {
        match method {
            ResolveMethod::AlbumApi => self.resolve_via_album_api(link).await,
            ResolveMethod::ExtensionGuess => self.resolve_by_guess(link).await,
            other => Err(ResolveError::invalid_link(
                &link.normalized,
                &format!("method {other} does not apply to Imgur links"),
            )),
        }
    }
}
