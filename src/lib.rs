//! Linkproxy Core Library
//!
//! Turns heterogeneous image sharing links (direct image URLs, Yandex Disk
//! public folders and files, Imgur albums and images) into references a
//! browser can display, and re-serves provider bytes under our own origin.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`classify`] - Pure link classification
//! - [`cache`] - Time-bounded store of resolved references and proxy targets
//! - [`rate_limiter`] - Per-provider outbound request spacing
//! - [`resolver`] - Provider resolvers and the retry/fallback registry
//! - [`service`] - The `resolve_image_reference` entry point
//! - [`proxy`] - Streaming proxy for `/resolve/{ref}` and `/image-proxy`
//! - [`catalog`] - Catalog assembly over an external row source
//! - [`server`] - Router composition for the HTTP surface

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod catalog;
pub mod classify;
pub mod proxy;
pub mod rate_limiter;
pub mod resolver;
pub mod server;
pub mod service;
#[cfg(test)]
pub mod test_support;
mod user_agent;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheStore, ProxyTarget};
pub use catalog::{
    CatalogAssembler, CatalogError, CatalogPage, CatalogRow, JsonFileRowSource, MemoryRowSource,
    RowPage, RowSource,
};
pub use classify::{ClassifiedLink, LinkKind, Provider, classify};
pub use proxy::StreamingProxy;
pub use rate_limiter::RateLimiter;
pub use resolver::{
    DEFAULT_MAX_RETRIES, ResolutionOutcome, ResolveError, ResolvedTarget, ResolverRegistry,
    RetryPolicy,
};
pub use server::build_router;
pub use service::{ImageLinkService, ServiceConfig, proxy_token};
