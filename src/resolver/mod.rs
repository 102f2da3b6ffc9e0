//! Link resolution: provider resolvers and the retry/fallback registry.
//!
//! # Architecture
//!
//! - [`Resolver`] - Async trait each provider family implements
//! - [`ResolverRegistry`] - Lookup table keyed on [`LinkKind`] that drives a
//!   resolver's fallback chain with bounded retries
//! - [`ResolvedTarget`] - What a successful method produced
//! - [`ResolutionOutcome`] - Terminal result of a registry resolution
//! - [`YandexDiskResolver`] - Public folders and files (container family)
//! - [`ImgurResolver`] - Albums and images (album family)
//! - [`DirectResolver`] - Passthrough for direct and unknown links
//!
//! # Example
//!
//! ```no_run
//! use linkproxy_core::classify;
//! use linkproxy_core::resolver::{ResolutionOutcome, ResolverRegistry, RetryPolicy, DirectResolver, RelayPolicy};
//!
//! # async fn example() {
//! let mut registry = ResolverRegistry::new(RetryPolicy::default());
//! registry.register(Box::new(DirectResolver::new(RelayPolicy::default())));
//!
//! let link = classify("https://site.example/img/abc.jpg");
//! if let ResolutionOutcome::Resolved(target) = registry.resolve(&link).await {
//!     println!("Resolved: {}", target.url());
//! }
//! # }
//! ```

mod direct;
mod error;
mod http_client;
mod imgur;
mod probe;
mod registry;
mod retry;
mod yandex;

pub use direct::{DEFAULT_PROXIED_HOSTS, DirectResolver, RelayPolicy};
pub use error::{FailureType, ResolveError};
pub use http_client::{HttpTimeouts, build_http_client, map_send_error, require_success};
pub use imgur::{
    DEFAULT_IMGUR_API_BASE, DEFAULT_IMGUR_IMAGE_BASE, GUESSED_EXTENSIONS, ImgurResolver,
};
pub use probe::ExistenceProbe;
pub use registry::ResolverRegistry;
pub use retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, FallbackChain, RetryPolicy, Transition,
};
pub use yandex::{
    DEFAULT_DISK_API_BASE, DEFAULT_DISK_MIRROR_BASE, EmbeddedItems, ResourceDescriptor,
    YandexDiskResolver,
};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::classify::{ClassifiedLink, LinkKind};
use crate::rate_limiter::RateLimiter;

/// One step of a provider's fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveMethod {
    /// Direct or unknown links are returned as they are.
    Passthrough,
    /// Yandex Disk public-resources metadata + download-handle calls.
    DiskPublicApi,
    /// Synthesized mirror URL for a Disk public file, verified by probe.
    DiskMirror,
    /// Imgur album-listing API.
    AlbumApi,
    /// Synthesized `{id}.{ext}` guesses, verified by probe.
    ExtensionGuess,
}

impl ResolveMethod {
    /// Stable method name for logs and aggregated failure reasons.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::DiskPublicApi => "disk-public-api",
            Self::DiskMirror => "disk-mirror",
            Self::AlbumApi => "album-api",
            Self::ExtensionGuess => "extension-guess",
        }
    }
}

impl fmt::Display for ResolveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A successfully resolved location and how the caller must reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// Dereferenceable by the caller as-is.
    Absolute(String),
    /// Must be served through `/resolve/{ref}` (expiring or credentialed handle).
    Proxied(String),
    /// Already-direct URL relayed through `/image-proxy?url=`.
    Relayed(String),
}

impl ResolvedTarget {
    /// The underlying URL regardless of how it is exposed.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Absolute(url) | Self::Proxied(url) | Self::Relayed(url) => url,
        }
    }
}

/// Terminal result of resolving one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// A dereferenceable target was found.
    Resolved(ResolvedTarget),
    /// Every method failed; the reason aggregates each attempt.
    Unresolvable(String),
}

/// Capability shared by every provider family.
///
/// A resolver declares which link kinds it owns and the ordered fallback
/// chain for a given link; the registry drives the chain and calls
/// [`attempt`](Resolver::attempt) once per try.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Box<dyn Resolver>` in the registry's lookup table.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the resolver's name (e.g., "direct", "yandex-disk", "imgur").
    fn name(&self) -> &'static str;

    /// Link kinds this resolver is registered for.
    fn kinds(&self) -> &'static [LinkKind];

    /// Ordered fallback chain for `link`. Earlier methods are always tried first.
    fn methods(&self, link: &ClassifiedLink) -> Vec<ResolveMethod>;

    /// Runs one method once.
    async fn attempt(
        &self,
        method: ResolveMethod,
        link: &ClassifiedLink,
    ) -> Result<ResolvedTarget, ResolveError>;
}

/// Endpoints and credentials for the provider resolvers.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Yandex Disk REST API base.
    pub disk_api_base: String,
    /// Mirror base for Disk public files; `None` disables the mirror method.
    pub disk_mirror_base: Option<String>,
    /// Optional Yandex OAuth token.
    pub disk_token: Option<String>,
    /// Maximum children requested per folder listing.
    pub disk_listing_limit: u32,
    /// Imgur API base.
    pub imgur_api_base: String,
    /// Imgur direct-image host used for extension guesses.
    pub imgur_image_base: String,
    /// Imgur API client id; the album API method needs it.
    pub imgur_client_id: Option<String>,
    /// Which direct links must be relayed through `/image-proxy`.
    pub relay: RelayPolicy,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            disk_api_base: DEFAULT_DISK_API_BASE.to_string(),
            disk_mirror_base: Some(DEFAULT_DISK_MIRROR_BASE.to_string()),
            disk_token: None,
            disk_listing_limit: 100,
            imgur_api_base: DEFAULT_IMGUR_API_BASE.to_string(),
            imgur_image_base: DEFAULT_IMGUR_IMAGE_BASE.to_string(),
            imgur_client_id: None,
            relay: RelayPolicy::default(),
        }
    }
}

/// Builds the default registry with every provider family registered.
#[must_use]
pub fn build_default_resolver_registry(
    settings: &ProviderSettings,
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    api_client: Client,
) -> ResolverRegistry {
    let probe = ExistenceProbe::new(api_client.clone());
    let mut registry = ResolverRegistry::new(policy);

    registry.register(Box::new(YandexDiskResolver::new(
        api_client.clone(),
        probe.clone(),
        Arc::clone(&limiter),
        settings,
    )));
    registry.register(Box::new(ImgurResolver::new(
        api_client, probe, limiter, settings,
    )));
    registry.register(Box::new(DirectResolver::new(settings.relay.clone())));
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_target_url() {
        assert_eq!(ResolvedTarget::Absolute("a".into()).url(), "a");
        assert_eq!(ResolvedTarget::Proxied("b".into()).url(), "b");
        assert_eq!(ResolvedTarget::Relayed("c".into()).url(), "c");
    }

    #[test]
    fn test_method_names_are_distinct() {
        let methods = [
            ResolveMethod::Passthrough,
            ResolveMethod::DiskPublicApi,
            ResolveMethod::DiskMirror,
            ResolveMethod::AlbumApi,
            ResolveMethod::ExtensionGuess,
        ];
        let names: std::collections::HashSet<_> = methods.iter().map(|m| m.name()).collect();
        assert_eq!(names.len(), methods.len());
    }

    #[test]
    fn test_default_registry_covers_every_kind() {
        let client = build_http_client("test", HttpTimeouts::api()).unwrap();
        let registry = build_default_resolver_registry(
            &ProviderSettings::default(),
            RetryPolicy::default(),
            Arc::new(RateLimiter::disabled()),
            client,
        );
        for kind in [
            LinkKind::DirectImage,
            LinkKind::DiskFolder,
            LinkKind::DiskFile,
            LinkKind::ImgurAlbum,
            LinkKind::ImgurImage,
            LinkKind::Unknown,
        ] {
            assert!(registry.resolver_for(kind).is_some(), "{kind:?} has no resolver");
        }
        assert_eq!(registry.resolver_count(), 3);
    }
}
