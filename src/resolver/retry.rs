//! Retry and fallback state machine for one resolution attempt.
//!
//! ```text
//! Start -> Attempting(method_i) -> Resolved
//!                               -> RetrySameMethod   (transient failure, retries left)
//!                               -> NextMethod(i + 1) (permanent failure or retries used up)
//!                               -> Exhausted         (no methods left)
//! ```
//!
//! [`FallbackChain`] performs no I/O and never sleeps; the registry drives it
//! and awaits the delays it hands back, so the transitions are unit-testable
//! on their own.

use std::time::Duration;

use tracing::debug;

use super::error::{FailureType, ResolveError};
use super::ResolveMethod;

/// Default number of retries of the same method (after the first attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default fixed delay between retries of the same method.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Bounded retry with a fixed inter-retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy retrying each method up to `max_retries` times.
    #[must_use]
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// A policy that never retries the same method.
    #[must_use]
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Returns the retry bound.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the inter-retry delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// What the driver should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Wait `delay`, then run the same method again.
    RetrySameMethod {
        /// Inter-retry delay.
        delay: Duration,
        /// Retry number about to run (1-indexed).
        retry: u32,
    },
    /// Run the next method in the chain.
    NextMethod(ResolveMethod),
    /// No methods left; resolution is unresolvable.
    Exhausted,
}

/// Ordered fallback chain with per-method retry bookkeeping.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    methods: Vec<ResolveMethod>,
    index: usize,
    retries: u32,
    policy: RetryPolicy,
    reasons: Vec<String>,
}

impl FallbackChain {
    /// Starts a chain at its first method.
    #[must_use]
    pub fn new(methods: Vec<ResolveMethod>, policy: RetryPolicy) -> Self {
        Self {
            methods,
            index: 0,
            retries: 0,
            policy,
            reasons: Vec::new(),
        }
    }

    /// The method to attempt now, or `None` once exhausted.
    #[must_use]
    pub fn current(&self) -> Option<ResolveMethod> {
        self.methods.get(self.index).copied()
    }

    /// Records a failure of the current method and advances the state machine.
    pub fn record_failure(&mut self, error: &ResolveError) -> Transition {
        let Some(method) = self.current() else {
            return Transition::Exhausted;
        };
        self.reasons.push(format!("{}: {error}", method.name()));

        if error.failure_type() == FailureType::Transient && self.retries < self.policy.max_retries
        {
            self.retries += 1;
            debug!(
                method = method.name(),
                retry = self.retries,
                "transient failure, retrying same method"
            );
            return Transition::RetrySameMethod {
                delay: self.policy.delay,
                retry: self.retries,
            };
        }

        self.index += 1;
        self.retries = 0;
        match self.current() {
            Some(next) => Transition::NextMethod(next),
            None => Transition::Exhausted,
        }
    }

    /// All recorded failure reasons joined in attempt order.
    #[must_use]
    pub fn aggregated_reason(&self) -> String {
        if self.reasons.is_empty() {
            "no resolution method available".to_string()
        } else {
            self.reasons.join("; ")
        }
    }
}
