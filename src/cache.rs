//! Time-bounded store of resolved image references.
//!
//! The [`CacheStore`] is constructed once per process and handed to every
//! component that needs it. It holds two tables:
//!
//! - resolved references keyed by the raw link ([`CacheEntry`])
//! - proxy targets keyed by the opaque `/resolve/{ref}` token ([`ProxyTarget`])
//! - relay grants: URLs the service handed out as `/image-proxy?url=` references
//!
//! Entries are replaced as a whole and never partially updated. Failures are
//! never cached, so a link whose provider recovers resolves on the next read.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// How long a proxy target outlives its expiry before `purge_expired` drops it.
pub const DEFAULT_TARGET_GRACE: Duration = Duration::from_secs(30 * 60);

/// A resolved reference for one raw link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The raw link this entry was resolved from.
    pub key: String,
    /// Absolute URL or internal proxy path; never a raw provider link.
    pub value: String,
    /// When the entry was inserted.
    pub created_at: Instant,
    /// Optional hard expiry (set for entries backed by expiring download handles).
    pub expires_at: Option<Instant>,
    /// Whether a hit should be re-probed before being trusted.
    pub volatile: bool,
}

impl CacheEntry {
    /// Creates an entry inserted now, expiring after `ttl` if given.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> Self {
        let created_at = Instant::now();
        Self {
            key: key.into(),
            value: value.into(),
            created_at,
            expires_at: ttl.map(|ttl| created_at + ttl),
            volatile: false,
        }
    }

    /// Marks the entry as backed by a volatile provider.
    #[must_use]
    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    /// Returns true once the hard expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time since insertion.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Upstream location behind an opaque `/resolve/{ref}` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Provider download URL the proxy fetches.
    pub upstream_url: String,
    /// Raw link the target was resolved from, used to re-resolve expired handles.
    pub raw_link: String,
    /// When the download handle is expected to stop working.
    pub expires_at: Option<Instant>,
}

impl ProxyTarget {
    /// Returns true once the download handle is past its expected lifetime.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Shared store for resolved references and proxy targets.
///
/// `CacheStore` is `Send + Sync`; wrap it in `Arc` to share it between the
/// service, the streaming proxy and background purge tasks.
#[derive(Debug)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    targets: DashMap<String, ProxyTarget>,
    relays: DashMap<String, Instant>,
    target_grace: Duration,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            targets: DashMap::new(),
            relays: DashMap::new(),
            target_grace: DEFAULT_TARGET_GRACE,
        }
    }
}

impl CacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long an expired, unreferenced proxy target is kept before purging.
    #[must_use]
    pub fn with_target_grace(mut self, grace: Duration) -> Self {
        self.target_grace = grace;
        self
    }

    /// Returns the live entry for `key`. Expired entries are dropped and reported as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key).map(|entry| entry.value().clone())?;
        if entry.is_expired() {
            debug!(key, "cache entry expired");
            self.entries.remove_if(key, |_, current| current.is_expired());
            return None;
        }
        Some(entry)
    }

    /// Inserts a fresh entry for `key`, replacing any previous one.
    pub fn put(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        self.insert(CacheEntry::new(key, value, ttl));
    }

    /// Inserts a prepared entry, replacing any previous one for the same key.
    pub fn insert(&self, entry: CacheEntry) {
        debug!(key = %entry.key, value = %entry.value, volatile = entry.volatile, "caching resolved reference");
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Removes the entry for `key`. Returns true if one was present.
    #[instrument(skip(self))]
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!("cache entry invalidated");
        }
        removed
    }

    /// Number of cached references (including not-yet-purged expired ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no references are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers (or replaces) the upstream behind a proxy token.
    pub fn put_target(&self, token: &str, target: ProxyTarget) {
        self.targets.insert(token.to_string(), target);
    }

    /// Looks up a proxy token. Expired targets are still returned so the
    /// caller can re-resolve from their raw link.
    #[must_use]
    pub fn target(&self, token: &str) -> Option<ProxyTarget> {
        self.targets.get(token).map(|target| target.value().clone())
    }

    /// Forgets a proxy token.
    pub fn remove_target(&self, token: &str) -> Option<ProxyTarget> {
        self.targets.remove(token).map(|(_, target)| target)
    }

    /// Allows `/image-proxy` to fetch `url` until `ttl` has passed.
    pub fn grant_relay(&self, url: &str, ttl: Duration) {
        self.relays.insert(url.to_string(), Instant::now() + ttl);
    }

    /// Returns true if `url` holds an unexpired relay grant.
    #[must_use]
    pub fn relay_granted(&self, url: &str) -> bool {
        self.relays
            .get(url)
            .is_some_and(|expires_at| Instant::now() < *expires_at)
    }

    /// Drops every expired entry and relay grant. Returns the number of
    /// entries dropped.
    ///
    /// A proxy target survives as long as its raw link still has a live entry,
    /// and for the grace period after its handle expired, so that stale
    /// references still dereference through re-resolution.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let purged = before.saturating_sub(self.entries.len());

        let now = Instant::now();
        self.relays.retain(|_, expires_at| now < *expires_at);

        let targets_before = self.targets.len();
        self.targets.retain(|_, target| {
            self.entries.contains_key(&target.raw_link)
                || target
                    .expires_at
                    .is_none_or(|at| now < at + self.target_grace)
        });
        let purged_targets = targets_before.saturating_sub(self.targets.len());

        if purged > 0 || purged_targets > 0 {
            debug!(purged, purged_targets, "purged expired cache entries");
        }
        purged
    }
}
