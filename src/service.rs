//! The resolution entry point consumed by catalog assembly.
//!
//! [`ImageLinkService::resolve_image_reference`] always returns a usable
//! reference: the link itself, an `/image-proxy?url=` path, a
//! `/resolve/{ref}` path, or the placeholder path. It never fails.
//!
//! Flow: classify, consult the [`CacheStore`], drive the
//! [`ResolverRegistry`] on a miss, then cache the success. Failures are
//! logged and answered with the placeholder but never cached.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheEntry, CacheStore, ProxyTarget};
use crate::classify::{LinkKind, Provider, classify};
use crate::rate_limiter::RateLimiter;
use crate::resolver::{
    ExistenceProbe, HttpTimeouts, ProviderSettings, ResolutionOutcome, ResolveError,
    ResolvedTarget, ResolverRegistry, RetryPolicy, build_default_resolver_registry,
    build_http_client,
};

/// Default placeholder asset path.
pub const DEFAULT_PLACEHOLDER_PATH: &str = "/placeholder.jpg";
/// Default route prefix for opaque proxy references.
pub const DEFAULT_PROXY_PREFIX: &str = "/resolve";
/// Default route for relaying already-direct URLs.
pub const DEFAULT_IMAGE_PROXY_PATH: &str = "/image-proxy";
/// Default lifetime of entries backed by expiring Disk download handles.
pub const DEFAULT_DISK_ENTRY_TTL: Duration = Duration::from_secs(30 * 60);
/// Default age after which a volatile cache hit is re-probed.
pub const DEFAULT_VOLATILE_RECHECK_AFTER: Duration = Duration::from_secs(10 * 60);
/// Default minimum spacing between Imgur API calls.
pub const DEFAULT_IMGUR_INTERVAL: Duration = Duration::from_secs(1);
/// Default minimum spacing between Disk API calls.
pub const DEFAULT_DISK_INTERVAL: Duration = Duration::from_millis(250);
/// Default `max-age` sent with proxied bytes.
pub const DEFAULT_PROXY_MAX_AGE: Duration = Duration::from_secs(3600);
/// Default lifetime of the grant behind an `/image-proxy?url=` reference.
pub const DEFAULT_RELAY_TTL: Duration = Duration::from_secs(6 * 3600);

/// Number of hex characters kept from the SHA-256 of a raw link.
const PROXY_TOKEN_LEN: usize = 32;

/// Library-side settings for the resolution subsystem.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path returned when a link cannot be resolved.
    pub placeholder_path: String,
    /// Route prefix for `/resolve/{ref}` references.
    pub proxy_prefix: String,
    /// Route for `/image-proxy?url=` references.
    pub image_proxy_path: String,
    /// TTL for entries backed by Disk download handles.
    pub disk_entry_ttl: Duration,
    /// Age after which a volatile (Imgur) hit is re-probed before use.
    pub volatile_recheck_after: Duration,
    /// Retry bound and delay for every fallback chain.
    pub retry: RetryPolicy,
    /// Minimum spacing between Imgur API calls.
    pub imgur_interval: Duration,
    /// Minimum spacing between Disk API calls.
    pub disk_interval: Duration,
    /// Timeouts for provider APIs and existence probes.
    pub api_timeouts: HttpTimeouts,
    /// Timeouts for the proxy's final byte fetch.
    pub stream_timeouts: HttpTimeouts,
    /// `Cache-Control: max-age` for proxied responses.
    pub proxy_max_age: Duration,
    /// How long `/image-proxy` keeps serving a URL after handing it out.
    pub relay_ttl: Duration,
    /// Provider endpoints, credentials and the relay policy.
    pub providers: ProviderSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            placeholder_path: DEFAULT_PLACEHOLDER_PATH.to_string(),
            proxy_prefix: DEFAULT_PROXY_PREFIX.to_string(),
            image_proxy_path: DEFAULT_IMAGE_PROXY_PATH.to_string(),
            disk_entry_ttl: DEFAULT_DISK_ENTRY_TTL,
            volatile_recheck_after: DEFAULT_VOLATILE_RECHECK_AFTER,
            retry: RetryPolicy::default(),
            imgur_interval: DEFAULT_IMGUR_INTERVAL,
            disk_interval: DEFAULT_DISK_INTERVAL,
            api_timeouts: HttpTimeouts::api(),
            stream_timeouts: HttpTimeouts::streaming(),
            proxy_max_age: DEFAULT_PROXY_MAX_AGE,
            relay_ttl: DEFAULT_RELAY_TTL,
            providers: ProviderSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Builds the rate limiter described by this configuration.
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(Duration::ZERO)
            .with_provider_interval(Provider::Imgur.name(), self.imgur_interval)
            .with_provider_interval(Provider::YandexDisk.name(), self.disk_interval)
    }
}

/// Derives the opaque `/resolve/{ref}` token for a raw link.
#[must_use]
pub fn proxy_token(raw_link: &str) -> String {
    let digest = Sha256::digest(raw_link.as_bytes());
    let mut token: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    token.truncate(PROXY_TOKEN_LEN);
    token
}

/// Resolves raw catalog image links into displayable references.
pub struct ImageLinkService {
    config: ServiceConfig,
    cache: Arc<CacheStore>,
    registry: ResolverRegistry,
    probe: ExistenceProbe,
}

impl ImageLinkService {
    /// Builds the service, its HTTP client, rate limiter and default registry.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the HTTP client cannot be constructed.
    pub fn from_config(config: ServiceConfig, cache: Arc<CacheStore>) -> Result<Self, ResolveError> {
        let client = build_http_client("resolver", config.api_timeouts)?;
        let limiter = Arc::new(config.rate_limiter());
        let registry = build_default_resolver_registry(
            &config.providers,
            config.retry,
            limiter,
            client.clone(),
        );
        Ok(Self::new(config, cache, registry, ExistenceProbe::new(client)))
    }

    /// Assembles a service from prepared parts.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        cache: Arc<CacheStore>,
        registry: ResolverRegistry,
        probe: ExistenceProbe,
    ) -> Self {
        Self {
            config,
            cache,
            registry,
            probe,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the shared cache store.
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Returns the placeholder path.
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.config.placeholder_path
    }

    /// Resolves a raw link into a reference the caller can always use.
    #[instrument(skip(self), fields(kind))]
    pub async fn resolve_image_reference(&self, raw_link: &str) -> String {
        let key = raw_link.trim();
        if key.is_empty() {
            return self.config.placeholder_path.clone();
        }

        let link = classify(key);
        tracing::Span::current().record("kind", tracing::field::debug(link.kind));

        if !link.kind.requires_resolution() {
            return match self.registry.resolve(&link).await {
                ResolutionOutcome::Resolved(target) => self.expose(key, &target, link.kind),
                ResolutionOutcome::Unresolvable(reason) => {
                    warn!(reason = %reason, "Direct link unresolvable, using placeholder");
                    self.config.placeholder_path.clone()
                }
            };
        }

        if let Some(value) = self.cached_reference(key).await {
            return value;
        }

        match self.registry.resolve(&link).await {
            ResolutionOutcome::Resolved(target) => {
                let reference = self.expose(key, &target, link.kind);
                self.remember(key, &reference, &target, link.kind);
                info!(reference = %reference, "Resolved image reference");
                reference
            }
            ResolutionOutcome::Unresolvable(reason) => {
                warn!(reason = %reason, "Link unresolvable, using placeholder");
                self.config.placeholder_path.clone()
            }
        }
    }

    /// Returns the proxy target for `token`, expired or not.
    #[must_use]
    pub fn proxy_target(&self, token: &str) -> Option<ProxyTarget> {
        self.cache.target(token)
    }

    /// Drops a stale target, re-resolves its raw link once and returns the new target.
    #[instrument(skip(self))]
    pub async fn refresh_target(&self, token: &str) -> Option<ProxyTarget> {
        let stale = self.cache.remove_target(token)?;
        self.cache.invalidate(&stale.raw_link);
        debug!(raw_link = %stale.raw_link, "Re-resolving stale proxy target");

        self.resolve_image_reference(&stale.raw_link).await;
        self.cache
            .target(token)
            .filter(|target| !target.is_expired())
    }

    /// Returns true if `/image-proxy` may fetch `url`: this service handed it
    /// out as a relay reference and the relay policy still covers it.
    #[must_use]
    pub fn relay_allowed(&self, url: &str) -> bool {
        self.cache.relay_granted(url) && self.config.providers.relay.requires_relay(url)
    }

    async fn cached_reference(&self, key: &str) -> Option<String> {
        let entry = self.cache.get(key)?;
        if entry.volatile && entry.age() >= self.config.volatile_recheck_after {
            if let Err(error) = self.probe.check(&entry.value).await {
                warn!(error = %error, "Cached reference failed freshness probe, invalidating");
                self.cache.invalidate(key);
                return None;
            }
            debug!("Volatile cache hit re-probed");
            self.cache
                .insert(CacheEntry::new(key, entry.value.clone(), None).volatile());
        }
        debug!(value = %entry.value, "Cache hit");
        Some(entry.value)
    }

    fn expose(&self, key: &str, target: &ResolvedTarget, kind: LinkKind) -> String {
        match target {
            ResolvedTarget::Absolute(url) => url.clone(),
            ResolvedTarget::Relayed(url) => {
                self.cache.grant_relay(url, self.config.relay_ttl);
                format!(
                    "{}?url={}",
                    self.config.image_proxy_path,
                    urlencoding::encode(url)
                )
            }
            ResolvedTarget::Proxied(url) => {
                let token = proxy_token(key);
                let ttl = self.ttl_for(kind);
                self.cache.put_target(
                    &token,
                    ProxyTarget {
                        upstream_url: url.clone(),
                        raw_link: key.to_string(),
                        expires_at: ttl.map(|ttl| Instant::now() + ttl),
                    },
                );
                format!("{}/{token}", self.config.proxy_prefix)
            }
        }
    }

    fn remember(&self, key: &str, reference: &str, target: &ResolvedTarget, kind: LinkKind) {
        let entry = CacheEntry::new(key, reference, self.ttl_for(kind));
        let entry = match (kind.provider(), target) {
            (Some(Provider::Imgur), ResolvedTarget::Absolute(_)) => entry.volatile(),
            _ => entry,
        };
        self.cache.insert(entry);
    }

    fn ttl_for(&self, kind: LinkKind) -> Option<Duration> {
        match kind.provider() {
            Some(Provider::YandexDisk) => Some(self.config.disk_entry_ttl),
            Some(Provider::Imgur) | None => None,
        }
    }
}

impl std::fmt::Debug for ImageLinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLinkService")
            .field("placeholder_path", &self.config.placeholder_path)
            .field("registry", &self.registry)
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}
