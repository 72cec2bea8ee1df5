//! Shared utilities for integration tests.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use serde_json::json;
use tempfile::TempDir;

use fs_router::http::{Hook, Reply};
use fs_router::Registry;

/// A route tree on disk, removed when dropped.
pub struct RouteTree {
    dir: TempDir,
}

impl RouteTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `relative`, creating parent directories.
    pub fn file(&self, relative: &str, content: &str) -> &Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }
}

/// Names of hooks in the order they ran.
pub type Trace = Arc<Mutex<Vec<String>>>;

#[allow(dead_code)]
pub fn hook_tracer(trace: &Trace, label: &str) -> Hook {
    let trace = trace.clone();
    let label = label.to_string();
    Hook::new(label.clone(), move |exchange| {
        let trace = trace.clone();
        let label = label.clone();
        async move {
            trace.lock().unwrap().push(label);
            Ok(exchange)
        }
    })
}

/// A registry with a `ok` handler and tracing hooks `a`, `b`, `c`, `d`.
#[allow(dead_code)]
pub fn tracing_registry(trace: &Trace) -> Registry {
    let mut registry = Registry::new().handler("ok", |exchange| async move {
        Ok(Reply::json(
            StatusCode::OK,
            json!({ "route": exchange.route, "params": exchange.params, "query": exchange.query }),
        ))
    });
    for name in ["a", "b", "c", "d"] {
        let hook = hook_tracer(trace, name);
        registry = registry.hook(name, move |exchange| hook.call(exchange));
    }
    registry
}
