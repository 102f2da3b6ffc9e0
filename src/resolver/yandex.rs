//! Yandex Disk resolver for public folder and public file links.
//!
//! Folders are listed through the public-resources API and the first child
//! with an `image/*` MIME type wins, in the order the API returns them. The
//! selected resource's download handle comes from a second API call. Handles
//! expire, so results are always [`ResolvedTarget::Proxied`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::classify::{ClassifiedLink, LinkKind, Provider};
use crate::rate_limiter::RateLimiter;

use super::http_client::{map_send_error, read_json, require_success};
use super::{ExistenceProbe, ProviderSettings, ResolveError, ResolveMethod, ResolvedTarget, Resolver};

/// Public Yandex Disk REST API base.
pub const DEFAULT_DISK_API_BASE: &str = "https://cloud-api.yandex.net";

/// Mirror that serves Disk public files as direct downloads.
pub const DEFAULT_DISK_MIRROR_BASE: &str = "https://getfile.dokpub.com";

const PROVIDER: Provider = Provider::YandexDisk;

/// Metadata returned by the public-resources API.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// `"dir"` for containers, `"file"` otherwise.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Resource name.
    #[serde(default)]
    pub name: Option<String>,
    /// MIME type reported for files.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Coarse media class (`"image"`, `"document"`, ...).
    #[serde(default)]
    pub media_type: Option<String>,
    /// Path of the resource inside the public folder.
    #[serde(default)]
    pub path: Option<String>,
    /// Direct download handle, when the listing includes one.
    #[serde(default)]
    pub file: Option<String>,
    /// Child listing for containers.
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedItems>,
}

/// The `_embedded` block of a container listing.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EmbeddedItems {
    /// Children in provider order.
    #[serde(default)]
    pub items: Vec<ResourceDescriptor>,
    /// Total number of children in the container.
    #[serde(default)]
    pub total: Option<u64>,
}

impl ResourceDescriptor {
    /// Returns true for folders.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.resource_type == "dir"
    }

    /// Children in provider-given order; empty for files.
    #[must_use]
    pub fn children(&self) -> &[ResourceDescriptor] {
        self.embedded.as_ref().map_or(&[], |embedded| &embedded.items)
    }

    /// Returns true if the MIME type (or, without one, the media type) says image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        match self.mime_type.as_deref() {
            Some(mime) => mime.to_ascii_lowercase().starts_with("image/"),
            None => self.media_type.as_deref() == Some("image"),
        }
    }
}

/// What to ask the download endpoint for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    /// The public link itself is the image file.
    Root,
    /// An image inside the public folder, addressed by its path.
    Child(String),
}

/// Picks the resource to download from a metadata answer.
fn select_image(descriptor: &ResourceDescriptor) -> Result<Selection, ResolveError> {
    if !descriptor.is_container() {
        return if descriptor.is_image() {
            Ok(Selection::Root)
        } else {
            Err(ResolveError::not_an_image(descriptor.mime_type.as_deref()))
        };
    }

    let children = descriptor.children();
    let image = children
        .iter()
        .find(|child| !child.is_container() && child.is_image())
        .ok_or(ResolveError::NoImageInContainer {
            children: children.len(),
        })?;
    image
        .path
        .clone()
        .filter(|path| !path.is_empty())
        .map(Selection::Child)
        .ok_or_else(|| ResolveError::malformed(PROVIDER.name(), "listed image has no path"))
}

#[derive(Debug, Deserialize)]
struct DownloadLink {
    #[serde(default)]
    href: Option<String>,
}

/// Resolver for Yandex Disk public links.
pub struct YandexDiskResolver {
    client: Client,
    probe: ExistenceProbe,
    limiter: Arc<RateLimiter>,
    api_base: String,
    mirror_base: Option<String>,
    token: Option<String>,
    listing_limit: u32,
}

impl YandexDiskResolver {
    /// Creates a resolver using the endpoints and token from `settings`.
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
            api_base: settings.disk_api_base.trim_end_matches('/').to_string(),
            mirror_base: settings
                .disk_mirror_base
                .as_deref()
                .map(|base| base.trim_end_matches('/').to_string())
                .filter(|base| !base.is_empty()),
            token: settings.disk_token.clone().filter(|token| !token.is_empty()),
            listing_limit: settings.disk_listing_limit.max(1),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ResolveError> {
        let mut url = Url::parse(&format!("{}{path}", self.api_base)).map_err(|error| {
            ResolveError::malformed(PROVIDER.name(), format!("invalid API base: {error}"))
        })?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ResolveError> {
        self.limiter.acquire(PROVIDER.name()).await;

        let url_text = url.to_string();
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("OAuth {token}"));
        }
        let response = request
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
        read_json(PROVIDER.name(), &url_text, response).await
    }

    #[instrument(skip(self, link), fields(provider = "yandex-disk", link = %link.normalized))]
    async fn resolve_via_api(&self, link: &ClassifiedLink) -> Result<ResolvedTarget, ResolveError> {
        let limit = self.listing_limit.to_string();
        let metadata_url = self.endpoint(
            "/v1/disk/public/resources",
            &[("public_key", link.normalized.as_str()), ("limit", limit.as_str())],
        )?;
        let descriptor: ResourceDescriptor = self.get_json(metadata_url).await?;

        let selection = select_image(&descriptor)?;
        debug!(?selection, children = descriptor.children().len(), "Selected Disk resource");

        let download_url = match &selection {
            Selection::Root => self.endpoint(
                "/v1/disk/public/resources/download",
                &[("public_key", link.normalized.as_str())],
            )?,
            Selection::Child(path) => self.endpoint(
                "/v1/disk/public/resources/download",
                &[("public_key", link.normalized.as_str()), ("path", path.as_str())],
            )?,
        };
        let handle: DownloadLink = self.get_json(download_url).await?;

        handle
            .href
            .filter(|href| !href.is_empty())
            .map(ResolvedTarget::Proxied)
            .ok_or_else(|| ResolveError::NoDownloadHandle {
                provider: PROVIDER.name().to_string(),
            })
    }

    #[instrument(skip(self, link), fields(provider = "yandex-disk", link = %link.normalized))]
    async fn resolve_via_mirror(
        &self,
        link: &ClassifiedLink,
    ) -> Result<ResolvedTarget, ResolveError> {
        let Some(mirror) = &self.mirror_base else {
            return Err(ResolveError::invalid_link(
                &link.normalized,
                "no Disk mirror configured",
            ));
        };
        let candidate = format!("{mirror}/yandex/get/{}", link.normalized);
        self.probe.check(&candidate).await?;
        Ok(ResolvedTarget::Proxied(candidate))
    }
}

impl std::fmt::Debug for YandexDiskResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YandexDiskResolver")
            .field("api_base", &self.api_base)
            .field("mirror_base", &self.mirror_base)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for YandexDiskResolver {
    fn name(&self) -> &'static str {
        PROVIDER.name()
    }

    fn kinds(&self) -> &'static [LinkKind] {
        &[LinkKind::DiskFolder, LinkKind::DiskFile]
    }

    fn methods(&self, link: &ClassifiedLink) -> Vec<ResolveMethod> {
        let mut methods = vec![ResolveMethod::DiskPublicApi];
        if link.kind == LinkKind::DiskFile && self.mirror_base.is_some() {
            methods.push(ResolveMethod::DiskMirror);
        }
        methods
    }

    async fn attempt(
        &self,
        method: ResolveMethod,
        link: &ClassifiedLink,
    ) -> Result<ResolvedTarget, ResolveError> {
        match method {
            ResolveMethod::DiskPublicApi => self.resolve_via_api(link).await,
            ResolveMethod::DiskMirror => self.resolve_via_mirror(link).await,
            other => Err(ResolveError::invalid_link(
                &link.normalized,
                &format!("method {other} does not apply to Disk links"),
            )),
        }
    }
}
