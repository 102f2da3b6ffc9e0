//! Resolver registry keyed on the link classification tag.
//!
//! The [`ResolverRegistry`] maps each [`LinkKind`] to the resolver that owns
//! it and drives that resolver's fallback chain under the shared
//! [`RetryPolicy`]. Failures never escape: they end up in
//! [`ResolutionOutcome::Unresolvable`] with an aggregated reason.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::classify::{ClassifiedLink, LinkKind};

use super::retry::{FallbackChain, RetryPolicy, Transition};
use super::{ResolutionOutcome, ResolveError, Resolver};

/// Lookup table from classification tag to resolver.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
    by_kind: HashMap<LinkKind, usize>,
    policy: RetryPolicy,
}

impl ResolverRegistry {
    /// Creates an empty registry using `policy` for every resolution.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            resolvers: Vec::new(),
            by_kind: HashMap::new(),
            policy,
        }
    }

    /// Registers a resolver for every kind it declares.
    ///
    /// A later registration for the same kind replaces the earlier mapping.
    #[tracing::instrument(skip(self, resolver), fields(resolver_name))]
    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        tracing::Span::current().record("resolver_name", resolver.name());
        debug!(
            name = resolver.name(),
            kinds = ?resolver.kinds(),
            "Registering resolver"
        );
        let index = self.resolvers.len();
        for kind in resolver.kinds() {
            self.by_kind.insert(*kind, index);
        }
        self.resolvers.push(resolver);
    }

    /// Returns the number of registered resolvers.
    #[must_use]
    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if no resolvers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Returns the retry policy applied to every resolution.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the resolver registered for `kind`, if any.
    #[must_use]
    pub fn resolver_for(&self, kind: LinkKind) -> Option<&dyn Resolver> {
        self.by_kind
            .get(&kind)
            .and_then(|index| self.resolvers.get(*index))
            .map(AsRef::as_ref)
    }

    /// Resolves one classified link through its resolver's fallback chain.
    ///
    /// Transient failures retry the same method after the policy delay;
    /// permanent failures, or retries used up, move to the next method.
    /// Every absorbed failure is logged. A link whose kind has no resolver is
    /// unresolvable.
    #[tracing::instrument(skip(self, link), fields(kind = ?link.kind, link = %link.normalized))]
    pub async fn resolve(&self, link: &ClassifiedLink) -> ResolutionOutcome {
        let Some(resolver) = self.resolver_for(link.kind) else {
            let error = ResolveError::NoResolver {
                input: link.normalized.clone(),
            };
            warn!(error = %error, "No resolver for link kind");
            return ResolutionOutcome::Unresolvable(error.to_string());
        };

        let mut chain = FallbackChain::new(resolver.methods(link), self.policy);
        while let Some(method) = chain.current() {
            debug!(resolver = resolver.name(), method = method.name(), "Trying method");
            match resolver.attempt(method, link).await {
                Ok(target) => {
                    info!(
                        resolver = resolver.name(),
                        method = method.name(),
                        url = %target.url(),
                        "Resolution successful"
                    );
                    return ResolutionOutcome::Resolved(target);
                }
                Err(error) => {
                    warn!(
                        resolver = resolver.name(),
                        method = method.name(),
                        error = %error,
                        failure_type = ?error.failure_type(),
                        "Resolution method failed"
                    );
                    match chain.record_failure(&error) {
                        Transition::RetrySameMethod { delay, retry } => {
                            debug!(method = method.name(), retry, ?delay, "Retrying after delay");
                            tokio::time::sleep(delay).await;
                        }
                        Transition::NextMethod(next) => {
                            debug!(from = method.name(), to = next.name(), "Falling back");
                        }
                        Transition::Exhausted => break,
                    }
                }
            }
        }

        let reason = chain.aggregated_reason();
        warn!(resolver = resolver.name(), reason = %reason, "Link unresolvable");
        ResolutionOutcome::Unresolvable(reason)
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("ResolverRegistry")
            .field("resolver_count", &self.resolvers.len())
            .field("resolvers", &names)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
