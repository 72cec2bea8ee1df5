//! Named callables that route files refer to.
//!
//! # Data Flow
//! ```text
//! application code
//!     → Registry::handler / Registry::hook (register by name)
//!     → route files name them (`default = "users.list"`, `onRequest = "auth"`)
//!     → loader resolves names while parsing modules
//! ```
//!
//! # Design Decisions
//! - Built once before loading and shared read-only via `Arc`
//! - Handlers and hooks live in separate namespaces

pub mod builtin;

use std::collections::HashMap;
use std::future::Future;

use crate::http::exchange::{Exchange, Reply, RequestError};
use crate::http::handler::{Handler, Hook};

pub use builtin::builtin;

/// Handlers and hooks addressable by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    handlers: HashMap<String, Handler>,
    hooks: HashMap<String, Hook>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request handler. A later registration replaces an earlier one.
    pub fn handler<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, RequestError>> + Send + 'static,
    {
        self.handlers.insert(name.to_string(), Handler::new(name, f));
        self
    }

    /// Register a lifecycle hook. A later registration replaces an earlier one.
    pub fn hook<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Exchange, RequestError>> + Send + 'static,
    {
        self.hooks.insert(name.to_string(), Hook::new(name, f));
        self
    }

    /// Add every entry of `other`, replacing same-named entries.
    pub fn merge(mut self, other: Registry) -> Self {
        self.handlers.extend(other.handlers);
        self.hooks.extend(other.hooks);
        self
    }

    pub fn get_handler(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn get_hook(&self, name: &str) -> Option<&Hook> {
        self.hooks.get(name)
    }

    pub fn handler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn hook_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
