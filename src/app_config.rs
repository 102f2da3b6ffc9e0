//! File configuration loading for server defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// TOML-backed file configuration. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Listen address, e.g. `0.0.0.0:3000`.
    pub bind: Option<String>,
    /// JSON file with catalog rows.
    pub rows: Option<PathBuf>,
    /// Directory served as the static fallback.
    pub static_dir: Option<PathBuf>,
    /// Row field holding the raw image link.
    pub photo_field: Option<String>,
    /// Placeholder path returned for unresolvable links.
    pub placeholder_path: Option<String>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,

    /// Retries of the same method after a transient failure.
    pub max_retries: Option<u8>,
    /// Delay between retries in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Minimum spacing between Imgur API calls in milliseconds.
    pub imgur_interval_ms: Option<u64>,
    /// Minimum spacing between Disk API calls in milliseconds.
    pub disk_interval_ms: Option<u64>,

    /// Lifetime of Disk-backed cache entries in seconds.
    pub disk_entry_ttl_secs: Option<u64>,
    /// Age in seconds after which an Imgur cache hit is re-probed.
    pub volatile_recheck_secs: Option<u64>,
    /// `Cache-Control: max-age` for proxied bytes.
    pub proxy_max_age_secs: Option<u64>,
    /// How long an `/image-proxy` reference stays fetchable, in seconds.
    pub relay_ttl_secs: Option<u64>,

    /// Provider API connect timeout in seconds.
    pub api_connect_timeout_secs: Option<u64>,
    /// Provider API read timeout in seconds.
    pub api_read_timeout_secs: Option<u64>,
    /// Proxy streaming connect timeout in seconds.
    pub stream_connect_timeout_secs: Option<u64>,
    /// Proxy streaming read timeout in seconds.
    pub stream_read_timeout_secs: Option<u64>,

    /// Hosts whose direct links are relayed through `/image-proxy`.
    pub proxied_hosts: Option<Vec<String>>,
    /// Relay plain `http://` image links.
    pub upgrade_insecure: Option<bool>,

    /// Yandex Disk API base URL.
    pub disk_api_base: Option<String>,
    /// Disk mirror base URL, or `"none"` to disable the mirror method.
    pub disk_mirror_base: Option<String>,
    /// Maximum children requested per folder listing.
    pub disk_listing_limit: Option<u32>,
    /// Imgur API base URL.
    pub imgur_api_base: Option<String>,
    /// Imgur image host used for extension guesses.
    pub imgur_image_base: Option<String>,
    /// Imgur API client id.
    pub imgur_client_id: Option<String>,
    /// Yandex Disk OAuth token.
    pub yandex_token: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 0..=10");
        }
        validate_max("retry_delay_ms", self.retry_delay_ms, 60_000)?;
        validate_max("imgur_interval_ms", self.imgur_interval_ms, 60_000)?;
        validate_max("disk_interval_ms", self.disk_interval_ms, 60_000)?;
        validate_range("disk_entry_ttl_secs", self.disk_entry_ttl_secs, 1, 86_400)?;
        validate_range("volatile_recheck_secs", self.volatile_recheck_secs, 0, 86_400)?;
        validate_max("proxy_max_age_secs", self.proxy_max_age_secs, 31_536_000)?;
        validate_range("relay_ttl_secs", self.relay_ttl_secs, 1, 604_800)?;
        validate_range("api_connect_timeout_secs", self.api_connect_timeout_secs, 1, 3600)?;
        validate_range("api_read_timeout_secs", self.api_read_timeout_secs, 1, 3600)?;
        validate_range(
            "stream_connect_timeout_secs",
            self.stream_connect_timeout_secs,
            1,
            3600,
        )?;
        validate_range("stream_read_timeout_secs", self.stream_read_timeout_secs, 1, 3600)?;
        if let Some(limit) = self.disk_listing_limit
            && !(1..=1000).contains(&limit)
        {
            bail!("Invalid config value for `disk_listing_limit`: {limit}. Expected range: 1..=1000");
        }
        if let Some(bind) = &self.bind
            && bind.parse::<std::net::SocketAddr>().is_err()
        {
            bail!("Invalid config value for `bind`: '{bind}'. Expected host:port, e.g. 127.0.0.1:3000");
        }
        if let Some(path) = &self.placeholder_path
            && !path.starts_with('/')
        {
            bail!("Invalid config value for `placeholder_path`: '{path}'. Expected an absolute path");
        }
        Ok(())
    }
}

fn validate_max(field: &str, value: Option<u64>, max: u64) -> Result<()> {
    validate_range(field, value, 0, max)
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Default log filter for this label.
    #[must_use]
    pub fn filter(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Config path that was consulted, if one could be determined.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/linkproxy/config.toml`
/// 2. `$HOME/.config/linkproxy/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("linkproxy")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("linkproxy")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` (which must exist) or the default config file if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}
