//! Per-provider rate limiting for metered provider APIs.
//!
//! The [`RateLimiter`] enforces a minimum spacing between requests to the same
//! provider. Requests to different providers never wait on each other.
//!
//! The spacing is reserved, not polled: under the provider lock we read the
//! last issued slot, compute the next one and record it, all without awaiting.
//! The wait for the reserved slot happens after the lock is released, so
//! concurrent callers are spaced correctly on a multi-threaded runtime.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use linkproxy_core::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(
//!     RateLimiter::new(Duration::ZERO).with_provider_interval("imgur", Duration::from_secs(1)),
//! );
//!
//! // First request proceeds immediately
//! limiter.acquire("imgur").await;
//!
//! // Second request to the same provider waits for the interval
//! limiter.acquire("imgur").await;
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Total wait per provider above which every further wait is logged as a warning.
const WAIT_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Upper bound applied to provider Retry-After values.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(3600);

/// Per-provider outbound request gate.
#[derive(Debug)]
pub struct RateLimiter {
    /// Interval used for providers without an explicit one.
    default_interval: Duration,

    /// Explicit per-provider intervals.
    intervals: HashMap<String, Duration>,

    /// Per-provider state. Arc lets us release the `DashMap` shard before waiting.
    providers: DashMap<String, Arc<ProviderState>>,
}

#[derive(Debug)]
struct ProviderState {
    /// Slot reserved by the most recent request; `None` until the first request.
    /// Held only for the read-compute-record step, never across an await.
    last_slot: Mutex<Option<Instant>>,

    /// Total time callers were held back for this provider, in milliseconds.
    waited_ms: AtomicU64,
}

impl ProviderState {
    fn new() -> Self {
        Self {
            last_slot: Mutex::new(None),
            waited_ms: AtomicU64::new(0),
        }
    }

    /// Adds `wait` to the running total and returns the new total.
    fn note_wait(&self, wait: Duration) -> Duration {
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        let total = self
            .waited_ms
            .fetch_add(wait_ms, Ordering::Relaxed)
            .saturating_add(wait_ms);
        Duration::from_millis(total)
    }

    /// Reserves the next slot at least `interval` after the previous one.
    fn reserve(&self, interval: Duration, now: Instant) -> Instant {
        let mut last = self
            .last_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = match *last {
            Some(previous) => (previous + interval).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }

    /// Pushes the next available slot to at least `not_before`.
    fn defer_until(&self, not_before: Instant) {
        let mut last = self
            .last_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let current = last.unwrap_or(not_before);
        *last = Some(current.max(not_before));
    }
}

impl RateLimiter {
    /// Creates a limiter applying `default_interval` to every provider.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = default_interval.as_millis()))]
    pub fn new(default_interval: Duration) -> Self {
        debug!("provider rate limiter ready");
        Self {
            default_interval,
            intervals: HashMap::new(),
            providers: DashMap::new(),
        }
    }

    /// Creates a limiter that applies no delays.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Sets the minimum spacing for one provider.
    #[must_use]
    pub fn with_provider_interval(mut self, provider: &str, interval: Duration) -> Self {
        self.intervals.insert(provider.to_string(), interval);
        self
    }

    /// Returns the minimum spacing applied to `provider`.
    #[must_use]
    pub fn interval_for(&self, provider: &str) -> Duration {
        self.intervals
            .get(provider)
            .copied()
            .unwrap_or(self.default_interval)
    }

    fn state(&self, provider: &str) -> Arc<ProviderState> {
        self.providers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(ProviderState::new()))
            .clone()
    }

    /// Waits until a request to `provider` may be issued.
    ///
    /// The first request to a provider proceeds immediately.
    #[instrument(skip(self))]
    pub async fn acquire(&self, provider: &str) {
        let interval = self.interval_for(provider);
        // Unspaced providers only wait once a Retry-After pause was recorded.
        if interval.is_zero() && !self.providers.contains_key(provider) {
            return;
        }

        let state = self.state(provider);
        let now = Instant::now();
        let slot = state.reserve(interval, now);
        if slot <= now {
            return;
        }

        let wait = slot - now;
        let total = state.note_wait(wait);
        if total >= WAIT_WARNING_THRESHOLD {
            warn!(
                wait_ms = wait.as_millis(),
                total_wait_secs = total.as_secs(),
                "provider calls are being held back heavily"
            );
        } else {
            debug!(wait_ms = wait.as_millis(), "waiting for provider slot");
        }
        tokio::time::sleep_until(slot).await;
    }

    /// Records a provider-mandated pause (from a Retry-After header).
    ///
    /// Subsequent [`acquire`](Self::acquire) calls for the provider wait at
    /// least until the pause is over.
    #[instrument(skip(self))]
    pub fn record_rate_limit(&self, provider: &str, delay: Duration) {
        let state = self.state(provider);
        state.defer_until(Instant::now() + delay);
        let total = state.note_wait(delay);
        warn!(
            pause_ms = delay.as_millis(),
            total_wait_secs = total.as_secs(),
            "provider asked us to back off"
        );
    }
}

/// Reads a Retry-After value given as delta-seconds or an HTTP-date.
///
/// Values above one hour are capped; dates in the past mean "now".
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use linkproxy_core::rate_limiter::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let value = header_value.trim();
    if value.starts_with('-') {
        debug!(value, "ignoring negative Retry-After");
        return None;
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(RETRY_AFTER_CAP));
    }

    let at = httpdate::parse_http_date(value)
        .map_err(|_| debug!(value, "ignoring unparseable Retry-After"))
        .ok()?;
    let wait = at
        .duration_since(std::time::SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Some(wait.min(RETRY_AFTER_CAP))
}
