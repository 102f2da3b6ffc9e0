//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;
use std::time::Duration;

use linkproxy_core::resolver::{HttpTimeouts, ProviderSettings, RelayPolicy};
use linkproxy_core::{CacheStore, ImageLinkService, RetryPolicy, ServiceConfig};

/// A service whose every provider endpoint points at `server_uri`.
pub fn config_for(server_uri: &str) -> ServiceConfig {
    ServiceConfig {
        retry: RetryPolicy::new(1, Duration::from_millis(10)),
        imgur_interval: Duration::ZERO,
        disk_interval: Duration::ZERO,
        api_timeouts: HttpTimeouts {
            connect: Duration::from_secs(2),
            read: Duration::from_millis(500),
        },
        providers: ProviderSettings {
            disk_api_base: server_uri.to_string(),
            disk_mirror_base: None,
            imgur_api_base: server_uri.to_string(),
            imgur_image_base: server_uri.to_string(),
            imgur_client_id: Some("test-client".to_string()),
            relay: RelayPolicy::default(),
            ..ProviderSettings::default()
        },
        ..ServiceConfig::default()
    }
}

pub fn service_with(config: ServiceConfig) -> (Arc<ImageLinkService>, Arc<CacheStore>) {
    let cache = Arc::new(CacheStore::new());
    let service = ImageLinkService::from_config(config, Arc::clone(&cache))
        .unwrap_or_else(|error| panic!("service construction failed: {error}"));
    (Arc::new(service), cache)
}

pub fn service_for(server_uri: &str) -> (Arc<ImageLinkService>, Arc<CacheStore>) {
    service_with(config_for(server_uri))
}
