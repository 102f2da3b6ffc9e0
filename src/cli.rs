//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Resolve cloud-storage sharing links into displayable catalog images.
///
/// Linkproxy classifies image links (direct URLs, Yandex Disk public folders
/// and files, Imgur albums and images), resolves them to something a browser
/// can load, and streams provider bytes under its own origin.
#[derive(Parser, Debug)]
#[command(name = "linkproxy")]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub serve: ServeArgs,
}

/// Options shared by every action.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/linkproxy/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Retries of the same method after a transient failure (0-10, default 2)
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Delay between retries in milliseconds (0-60000, default 500)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub retry_delay_ms: Option<u64>,

    /// Imgur API client id
    #[arg(long, global = true, env = "IMGUR_CLIENT_ID", hide_env_values = true)]
    pub imgur_client_id: Option<String>,

    /// Yandex Disk OAuth token (optional; public links work without one)
    #[arg(long, global = true, env = "YANDEX_DISK_TOKEN", hide_env_values = true)]
    pub yandex_token: Option<String>,
}

/// Options for the HTTP server.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to listen on (default 127.0.0.1:3000)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// JSON file with catalog rows; enables /api/containers
    #[arg(long)]
    pub rows: Option<PathBuf>,

    /// Directory with front-end assets and the placeholder image
    #[arg(long)]
    pub static_dir: Option<PathBuf>,
}

/// Available actions. Serving is the default.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Resolve links once and print the reference for each
    Resolve {
        /// Links to resolve
        #[arg(required = true)]
        links: Vec<String>,
    },
}
