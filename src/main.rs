//! CLI entry point for the linkproxy server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use linkproxy_core::{
    CacheStore, CatalogAssembler, ImageLinkService, JsonFileRowSource, StreamingProxy,
    build_router,
};
use tracing::{debug, info};

mod app_config;
mod cli;
mod config_runtime;

use cli::{Cli, Command};
use config_runtime::RuntimeSettings;

/// How often expired cache entries are dropped.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    let loaded = app_config::load_config(cli.global.config.as_deref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = config_runtime::default_log_filter(&cli.global, loaded.config.as_ref());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, config_path = ?loaded.path, "CLI arguments parsed");

    let settings = config_runtime::merge(&cli.global, &cli.serve, loaded.config.as_ref())?;
    let cache = Arc::new(CacheStore::new().with_target_grace(settings.service.disk_entry_ttl));
    let service = Arc::new(
        ImageLinkService::from_config(settings.service.clone(), Arc::clone(&cache))
            .context("Failed to initialise the resolver service")?,
    );

    match cli.command {
        Some(Command::Resolve { links }) => run_resolve(&service, &links).await,
        Some(Command::Serve) | None => run_serve(settings, service, cache).await,
    }
}

async fn run_resolve(service: &ImageLinkService, links: &[String]) -> Result<()> {
    for link in links {
        let reference = service.resolve_image_reference(link).await;
        println!("{link}\t{reference}");
    }
    Ok(())
}

async fn run_serve(
    settings: RuntimeSettings,
    service: Arc<ImageLinkService>,
    cache: Arc<CacheStore>,
) -> Result<()> {
    let proxy = Arc::new(
        StreamingProxy::new(Arc::clone(&service)).context("Failed to initialise the proxy")?,
    );
    let catalog = settings.rows.as_ref().map(|rows| {
        info!(rows = %rows.display(), "Catalog enabled");
        Arc::new(
            CatalogAssembler::new(Arc::new(JsonFileRowSource::new(rows)), Arc::clone(&service))
                .with_photo_field(settings.photo_field.clone()),
        )
    });
    let router = build_router(proxy, catalog, settings.static_dir.clone());

    let purge = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            cache.purge_expired();
        }
    });

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind))?;
    info!(bind = %settings.bind, "Linkproxy listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    purge.abort();
    info!("Linkproxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
