//! fs-router
//!
//! Serves an HTTP API whose routes are declared by a directory tree.
//!
//! # Architecture Overview
//!
//! ```text
//!     routes/ tree ──▶ routing::loader ──▶ RouteTable ──▶ http::server ──▶ Axum
//!                           │                                  ▲
//!                           ▼                                  │
//!                     registry (named              routing::watcher (hot reload,
//!                     handlers + hooks)            arc-swap of the Router)
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fs_router::config::{load_config, RouterConfig};
use fs_router::lifecycle::signals::spawn_signal_listener;
use fs_router::lifecycle::startup::{bind, load_routes, serve};
use fs_router::lifecycle::Shutdown;
use fs_router::observability::logging::init_logging;
use fs_router::registry;

#[derive(Parser)]
#[command(name = "fs-router")]
#[command(about = "Serve HTTP routes declared by a directory tree", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the route tree and serve it (default)
    Serve,
    /// Load the route tree and print the route listing
    Routes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    init_logging(&config.observability);

    tracing::info!("fs-router v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes_root = %config.routes.root.display(),
        prefix = %config.routes.prefix,
        watch = config.routes.watch,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Routes => {
            let (table, report) = load_routes(&config.routes, registry::builtin().into()).await?;
            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            print!("{}", table.listing());
        }
        Commands::Serve => {
            let shutdown = Shutdown::new();
            spawn_signal_listener(&shutdown);

            let listener = bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");

            serve(config, registry::builtin(), listener, shutdown).await?;
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}
