//! Route tree watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches a route tree and signals when anything under it changes.
pub struct RouteWatcher {
    root: PathBuf,
    change_tx: mpsc::UnboundedSender<PathBuf>,
}

impl RouteWatcher {
    /// Create a new RouteWatcher.
    ///
    /// Returns the watcher and a receiver of changed paths.
    pub fn new(root: &Path) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        (
            Self {
                root: root.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        tracing::info!(root = ?self.root, "Route watcher started");
        Ok(watcher)
    }
}

/// Wait for the next change, then swallow the burst that follows it.
///
/// Returns `None` once the watcher is gone.
pub async fn next_change(rx: &mut mpsc::UnboundedReceiver<PathBuf>, settle: Duration) -> Option<PathBuf> {
    let first = rx.recv().await?;
    loop {
        match tokio::time::timeout(settle, rx.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return Some(first),
        }
    }
}
