//! Error types for resolver operations.
//!
//! Every external call made by a resolver returns `Result<_, ResolveError>`.
//! None of these errors leave the registry: they are absorbed into
//! [`ResolutionOutcome::Unresolvable`](super::ResolutionOutcome) and the
//! caller only ever sees the placeholder reference.

use thiserror::Error;

/// Whether retrying the same resolution method may help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure (timeout, connection error, 5xx, 429).
    Transient,
    /// Retrying the same method with the same inputs will fail again.
    Permanent,
}

/// Errors that can occur while resolving a link.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The provider did not answer within the configured timeout.
    #[error("timeout calling {provider} at {url}")]
    UpstreamTimeout {
        /// Provider or component issuing the call.
        provider: String,
        /// The URL that timed out.
        url: String,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} rejected {url} with HTTP {status}")]
    UpstreamRejected {
        /// Provider or component issuing the call.
        provider: String,
        /// The requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Connection-level failure (DNS, refused, TLS, reset).
    #[error("network error calling {provider} at {url}: {message}")]
    Network {
        /// Provider or component issuing the call.
        provider: String,
        /// The requested URL.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// The provider answered 2xx but the body was not what we expected.
    #[error("malformed response from {provider}: {reason}")]
    MalformedResponse {
        /// Provider that answered.
        provider: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// A single resource whose MIME type is not `image/*`.
    #[error("resource is not an image (mime type: {mime_type})")]
    ResourceNotAnImage {
        /// The reported MIME type, or "unknown".
        mime_type: String,
    },

    /// A container listing without any `image/*` child.
    #[error("no image in container ({children} item(s) listed)")]
    NoImageInContainer {
        /// Number of listed children.
        children: usize,
    },

    /// The provider returned no download handle for the selected resource.
    #[error("{provider} returned no download handle")]
    NoDownloadHandle {
        /// Provider that answered.
        provider: String,
    },

    /// A previously issued download handle no longer works.
    #[error("download handle expired for {url} (HTTP {status})")]
    HandleExpired {
        /// The stale upstream URL.
        url: String,
        /// HTTP status returned for it.
        status: u16,
    },

    /// A credential required by this method is not configured.
    #[error("{provider} credential missing: {what}\n  Suggestion: {suggestion}")]
    MissingCredential {
        /// Provider needing the credential.
        provider: String,
        /// Which credential is missing.
        what: String,
        /// How to provide it.
        suggestion: String,
    },

    /// The link lacks the information this method needs (e.g. no identifier).
    #[error("invalid link '{input}': {reason}")]
    InvalidLink {
        /// The link as classified.
        input: String,
        /// Why it cannot be resolved by this method.
        reason: String,
    },

    /// An existence probe did not confirm the URL.
    #[error("existence probe failed for {url}: {reason}")]
    ProbeFailed {
        /// The probed URL.
        url: String,
        /// Why the probe failed.
        reason: String,
    },

    /// No resolver is registered for the link's provider family.
    #[error("no resolver registered for '{input}'")]
    NoResolver {
        /// The link as classified.
        input: String,
    },
}

impl ResolveError {
    /// Creates an `UpstreamTimeout` error.
    #[must_use]
    pub fn timeout(provider: &str, url: &str) -> Self {
        Self::UpstreamTimeout {
            provider: provider.to_string(),
            url: url.to_string(),
        }
    }

    /// Creates an `UpstreamRejected` error.
    #[must_use]
    pub fn rejected(provider: &str, url: &str, status: u16) -> Self {
        Self::UpstreamRejected {
            provider: provider.to_string(),
            url: url.to_string(),
            status,
        }
    }

    /// Creates a `Network` error.
    #[must_use]
    pub fn network(provider: &str, url: &str, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.to_string(),
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Creates a `MalformedResponse` error.
    #[must_use]
    pub fn malformed(provider: &str, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `ResourceNotAnImage` error.
    #[must_use]
    pub fn not_an_image(mime_type: Option<&str>) -> Self {
        Self::ResourceNotAnImage {
            mime_type: mime_type.unwrap_or("unknown").to_string(),
        }
    }

    /// Creates a `MissingCredential` error.
    #[must_use]
    pub fn missing_credential(provider: &str, what: &str, env_var: &str) -> Self {
        Self::MissingCredential {
            provider: provider.to_string(),
            what: what.to_string(),
            suggestion: format!("Set {env_var} or add it to the config file"),
        }
    }

    /// Creates an `InvalidLink` error.
    #[must_use]
    pub fn invalid_link(input: &str, reason: &str) -> Self {
        Self::InvalidLink {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `ProbeFailed` error.
    #[must_use]
    pub fn probe_failed(url: &str, reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Classifies the error for retry decisions.
    ///
    /// | Error | Type |
    /// |-------|------|
    /// | Timeout, Network | Transient |
    /// | HTTP 408, 429, 5xx | Transient |
    /// | Other HTTP statuses | Permanent |
    /// | Everything else | Permanent |
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::UpstreamTimeout { .. } | Self::Network { .. } => FailureType::Transient,
            Self::UpstreamRejected { status, .. } => match status {
                408 | 429 | 500..=599 => FailureType::Transient,
                _ => FailureType::Permanent,
            },
            Self::MalformedResponse { .. }
            | Self::ResourceNotAnImage { .. }
            | Self::NoImageInContainer { .. }
            | Self::NoDownloadHandle { .. }
            | Self::HandleExpired { .. }
            | Self::MissingCredential { .. }
            | Self::InvalidLink { .. }
            | Self::ProbeFailed { .. }
            | Self::NoResolver { .. } => FailureType::Permanent,
        }
    }

    /// Turns a rejection of a download handle into `HandleExpired`.
    /// Any other error is returned unchanged.
    #[must_use]
    pub fn into_handle_expired(self) -> Self {
        match self {
            Self::UpstreamRejected { url, status, .. } if is_stale_handle_status(status) => {
                Self::HandleExpired { url, status }
            }
            other => other,
        }
    }
}

/// Statuses a provider answers once a download handle stopped working.
fn is_stale_handle_status(status: u16) -> bool {
    matches!(status, 401 | 403 | 404 | 410)
}
