//! Shared User-Agent string for provider API, probe and proxy traffic.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/nicksrandall/linkproxy";

/// Default User-Agent for every outbound request (one format for all providers).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("linkproxy/{version} (catalog-image-proxy; +{PROJECT_UA_URL})")
}
