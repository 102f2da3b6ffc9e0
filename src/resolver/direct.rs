//! Direct link resolver - passthrough for already-direct and unknown links.
//!
//! The [`DirectResolver`] never calls out. It returns the normalized link
//! unchanged unless the [`RelayPolicy`] says the browser cannot load it from
//! its own host (mirror hosts that block hot-linking, or plain `http://` on an
//! `https://` page), in which case the link is relayed through
//! `/image-proxy`.

use async_trait::async_trait;
use url::Url;

use crate::classify::{ClassifiedLink, LinkKind};

use super::{ResolveError, ResolveMethod, ResolvedTarget, Resolver};

/// Hosts relayed through `/image-proxy` by default.
pub const DEFAULT_PROXIED_HOSTS: [&str; 1] = ["getfile.dokpub.com"];

/// Decides which direct links are relayed and which `/image-proxy` URLs are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPolicy {
    proxied_hosts: Vec<String>,
    upgrade_insecure: bool,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PROXIED_HOSTS.iter().map(ToString::to_string), true)
    }
}

impl RelayPolicy {
    /// Creates a policy relaying `proxied_hosts` and, when `upgrade_insecure`
    /// is set, every plain `http://` link.
    #[must_use]
    pub fn new(proxied_hosts: impl IntoIterator<Item = String>, upgrade_insecure: bool) -> Self {
        Self {
            proxied_hosts: proxied_hosts
                .into_iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
            upgrade_insecure,
        }
    }

    /// A policy that never relays anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Vec::new(), false)
    }

    /// Returns the configured relay hosts.
    #[must_use]
    pub fn proxied_hosts(&self) -> &[String] {
        &self.proxied_hosts
    }

    /// Returns true if `url` must be served through `/image-proxy`.
    ///
    /// `/image-proxy` refuses any URL this returns false for, and any URL the
    /// service did not hand out itself.
    #[must_use]
    pub fn requires_relay(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        match parsed.scheme() {
            "http" if self.upgrade_insecure => true,
            "http" | "https" => parsed.host_str().is_some_and(|host| {
                let host = host.to_ascii_lowercase();
                self.proxied_hosts
                    .iter()
                    .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
            }),
            _ => false,
        }
    }
}

/// A resolver that passes direct and unrecognized links through.
#[derive(Debug, Default)]
pub struct DirectResolver {
    relay: RelayPolicy,
}

impl DirectResolver {
    /// Creates a new `DirectResolver` using `relay` to pick relayed links.
    #[must_use]
    pub fn new(relay: RelayPolicy) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn kinds(&self) -> &'static [LinkKind] {
        &[LinkKind::DirectImage, LinkKind::Unknown]
    }

    fn methods(&self, _link: &ClassifiedLink) -> Vec<ResolveMethod> {
        vec![ResolveMethod::Passthrough]
    }

    #[tracing::instrument(skip(self, link), fields(resolver = "direct"))]
    async fn attempt(
        &self,
        _method: ResolveMethod,
        link: &ClassifiedLink,
    ) -> Result<ResolvedTarget, ResolveError> {
        if self.relay.requires_relay(&link.normalized) {
            Ok(ResolvedTarget::Relayed(link.normalized.clone()))
        } else {
            Ok(ResolvedTarget::Absolute(link.normalized.clone()))
        }
    }
}
