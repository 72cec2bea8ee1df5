//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the route tree and report what was registered
//! - Start background tasks (metrics, route watcher)
//! - Serve on a bound listener until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A failed hot reload is not: the current routes keep serving
//! - Listeners are bound by the caller, so tests can use port 0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ConfigError, RouterConfig, RoutesConfig};
use crate::http::server::{HttpServer, ReloadHandle};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::registry::Registry;
use crate::routing::loader::{LoadReport, RouteLoader};
use crate::routing::table::{RoutePrefix, RouteTable};
use crate::routing::watcher::{next_change, RouteWatcher};
use crate::routing::LoadError;

/// Quiet period after a file change before the tree is reloaded.
const RELOAD_SETTLE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Load the configured route tree into a fresh table.
pub async fn load_routes(config: &RoutesConfig, registry: Arc<Registry>) -> Result<(RouteTable, LoadReport), LoadError> {
    let loader = RouteLoader::new(config.conventions(), registry);
    let mut table = RouteTable::new();
    let report = loader
        .load(&config.root, RoutePrefix::parse(&config.prefix), Vec::new(), &mut table)
        .await?;
    Ok((table, report))
}

pub async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}

/// Load routes and serve them on `listener` until `shutdown` fires.
pub async fn serve(
    config: RouterConfig,
    registry: Registry,
    listener: TcpListener,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(registry);
    let (table, report) = load_routes(&config.routes, registry.clone()).await?;
    tracing::info!(
        routes = report.routes,
        warnings = report.warnings.len(),
        "Routes loaded\n{}",
        table.listing()
    );

    let server = HttpServer::new(&table, config.request_limits());
    // Keep the watcher alive for as long as the server runs.
    let _watcher = if config.routes.watch {
        Some(spawn_reloader(config.routes.clone(), registry, server.reload_handle(), &shutdown)?)
    } else {
        None
    };

    server.run(listener, &shutdown).await.map_err(StartupError::Serve)
}

/// Watch the route tree and swap in a fresh table after every change.
pub fn spawn_reloader(
    config: RoutesConfig,
    registry: Arc<Registry>,
    handle: ReloadHandle,
    shutdown: &Shutdown,
) -> Result<notify::RecommendedWatcher, StartupError> {
    let (watcher, mut changes) = RouteWatcher::new(&config.root);
    let watcher = watcher.run().map_err(|source| StartupError::Watch {
        path: config.root.clone(),
        source,
    })?;

    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            let changed = tokio::select! {
                changed = next_change(&mut changes, RELOAD_SETTLE) => changed,
                _ = stop.recv() => break,
            };
            let Some(changed) = changed else { break };

            tracing::info!(path = ?changed, "Route tree change detected, reloading...");
            match load_routes(&config, registry.clone()).await {
                Ok((table, _)) => {
                    handle.replace(&table);
                    metrics::record_reload(true);
                }
                Err(e) => {
                    tracing::error!("Failed to reload routes: {}. Keeping current routes.", e);
                    metrics::record_reload(false);
                }
            }
        }
        tracing::debug!("Route reloader stopped");
    });

    Ok(watcher)
}
