//! Merges CLI flags, file config and library defaults into runtime settings.
//!
//! Priority: CLI value > config file value > default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use linkproxy_core::ServiceConfig;
use linkproxy_core::catalog::DEFAULT_PHOTO_FIELD;
use linkproxy_core::resolver::{HttpTimeouts, RelayPolicy, RetryPolicy};

use crate::app_config::FileConfig;
use crate::cli::{GlobalArgs, ServeArgs};

/// Default listen address.
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Disables the Disk mirror method when used as `disk_mirror_base`.
const MIRROR_DISABLED: &str = "none";

/// Everything the binary needs after merging.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) bind: SocketAddr,
    pub(crate) rows: Option<PathBuf>,
    pub(crate) static_dir: Option<PathBuf>,
    pub(crate) photo_field: String,
    pub(crate) service: ServiceConfig,
}

/// Picks the default log filter when `RUST_LOG` is unset.
pub(crate) fn default_log_filter(global: &GlobalArgs, file: Option<&FileConfig>) -> &'static str {
    if global.quiet {
        return "error";
    }
    match global.verbose {
        0 => file
            .and_then(|cfg| cfg.verbosity)
            .map_or("info", |verbosity| verbosity.filter()),
        1 => "debug",
        _ => "trace",
    }
}

pub(crate) fn merge(
    global: &GlobalArgs,
    serve: &ServeArgs,
    file: Option<&FileConfig>,
) -> Result<RuntimeSettings> {
    let empty = FileConfig::default();
    let file = file.unwrap_or(&empty);
    let mut service = ServiceConfig::default();

    let max_retries = global
        .max_retries
        .or(file.max_retries)
        .map_or(service.retry.max_retries(), u32::from);
    let retry_delay = global
        .retry_delay_ms
        .or(file.retry_delay_ms)
        .map_or(service.retry.delay(), Duration::from_millis);
    service.retry = RetryPolicy::new(max_retries, retry_delay);

    if let Some(path) = &file.placeholder_path {
        service.placeholder_path.clone_from(path);
    }
    if let Some(ms) = file.imgur_interval_ms {
        service.imgur_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = file.disk_interval_ms {
        service.disk_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = file.disk_entry_ttl_secs {
        service.disk_entry_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = file.volatile_recheck_secs {
        service.volatile_recheck_after = Duration::from_secs(secs);
    }
    if let Some(secs) = file.proxy_max_age_secs {
        service.proxy_max_age = Duration::from_secs(secs);
    }
    if let Some(secs) = file.relay_ttl_secs {
        service.relay_ttl = Duration::from_secs(secs);
    }
    service.api_timeouts = timeouts(
        HttpTimeouts::api(),
        file.api_connect_timeout_secs,
        file.api_read_timeout_secs,
    );
    service.stream_timeouts = timeouts(
        HttpTimeouts::streaming(),
        file.stream_connect_timeout_secs,
        file.stream_read_timeout_secs,
    );

    let providers = &mut service.providers;
    if file.proxied_hosts.is_some() || file.upgrade_insecure.is_some() {
        let hosts = file.proxied_hosts.clone().unwrap_or_else(|| {
            linkproxy_core::resolver::DEFAULT_PROXIED_HOSTS
                .iter()
                .map(ToString::to_string)
                .collect()
        });
        providers.relay = RelayPolicy::new(hosts, file.upgrade_insecure.unwrap_or(true));
    }
    if let Some(base) = &file.disk_api_base {
        providers.disk_api_base.clone_from(base);
    }
    if let Some(base) = &file.disk_mirror_base {
        providers.disk_mirror_base =
            (!base.eq_ignore_ascii_case(MIRROR_DISABLED)).then(|| base.clone());
    }
    if let Some(limit) = file.disk_listing_limit {
        providers.disk_listing_limit = limit;
    }
    if let Some(base) = &file.imgur_api_base {
        providers.imgur_api_base.clone_from(base);
    }
    if let Some(base) = &file.imgur_image_base {
        providers.imgur_image_base.clone_from(base);
    }
    providers.imgur_client_id = global
        .imgur_client_id
        .clone()
        .or_else(|| file.imgur_client_id.clone());
    providers.disk_token = global
        .yandex_token
        .clone()
        .or_else(|| file.yandex_token.clone());

    let bind = match (serve.bind, &file.bind) {
        (Some(bind), _) => bind,
        (None, Some(text)) => text
            .parse()
            .with_context(|| format!("Invalid bind address '{text}'"))?,
        (None, None) => DEFAULT_BIND
            .parse()
            .with_context(|| format!("Invalid bind address '{DEFAULT_BIND}'"))?,
    };

    Ok(RuntimeSettings {
        bind,
        rows: serve.rows.clone().or_else(|| file.rows.clone()),
        static_dir: serve.static_dir.clone().or_else(|| file.static_dir.clone()),
        photo_field: file
            .photo_field
            .clone()
            .unwrap_or_else(|| DEFAULT_PHOTO_FIELD.to_string()),
        service,
    })
}

fn timeouts(defaults: HttpTimeouts, connect: Option<u64>, read: Option<u64>) -> HttpTimeouts {
    HttpTimeouts {
        connect: connect.map_or(defaults.connect, Duration::from_secs),
        read: read.map_or(defaults.read, Duration::from_secs),
    }
}
