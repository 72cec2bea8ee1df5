//! Registered routes and scope hooks.
//!
//! # Responsibilities
//! - Store route definitions and directory-scope hooks as the loader emits them
//! - Reject duplicate method + path registrations
//! - Reject segments the HTTP router cannot express
//! - Resolve the effective hook list of each route
//! - Render the route listing
//!
//! # Design Decisions
//! - A scope hook applies to every route whose prefix starts with the scope,
//!   compared segment by segment (`/user` is not an ancestor of `/users`)
//! - Scope hooks run before the route's own hooks, in registration order

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::http::exchange::percent_decode;
use crate::http::handler::{Handler, Hook};
use crate::routing::error::RegistrationError;
use crate::routing::hooks::{HookName, HookSet};
use crate::routing::loader::RouteRegistrar;
use crate::routing::method::HttpMethod;
use crate::routing::schema::RouteSchema;

/// Parameter name of a `:name` segment.
fn param_name(segment: &str) -> Option<&str> {
    segment.strip_prefix(':')
}

/// Why `segment` cannot be routed, if it cannot.
fn segment_problem(segment: &str) -> Option<&'static str> {
    if segment.starts_with('*') {
        return Some("wildcard segments are not supported");
    }
    if segment.contains(['{', '}']) {
        return Some("braces are reserved");
    }
    match param_name(segment) {
        Some("") => Some("parameter has no name"),
        Some(name) if name.contains(':') => Some("parameter name contains `:`"),
        _ => None,
    }
}

/// Ordered path segments of a route. `:name` segments are parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutePrefix {
    segments: Vec<String>,
}

impl RoutePrefix {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `/a/b`, `a/b/` or `` into segments; empty segments are dropped.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// A new prefix with `segment` appended.
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &RoutePrefix) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Path in axum's syntax: `:id` becomes `{id}`.
    pub fn axum_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match param_name(segment) {
                Some(name) => {
                    path.push('{');
                    path.push_str(name);
                    path.push('}');
                }
                None => path.push_str(segment),
            }
        }
        path
    }

    /// First segment that cannot be routed, with the reason.
    pub fn invalid_segment(&self) -> Option<(&str, &'static str)> {
        self.segments
            .iter()
            .find_map(|segment| segment_problem(segment).map(|reason| (segment.as_str(), reason)))
    }

    /// True if both prefixes put differently named parameters at the same
    /// position after an identical lead, e.g. `/users/:id` and `/users/:name/posts`.
    pub fn param_conflict(&self, other: &RoutePrefix) -> bool {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            if a == b {
                continue;
            }
            return param_name(a).is_some() && param_name(b).is_some();
        }
        false
    }

    /// Values of `:name` segments taken from a request path that matched this prefix.
    pub fn extract_params(&self, path: &str) -> Map<String, Value> {
        let mut params = Map::new();
        let actual = path.split('/').filter(|s| !s.is_empty());
        for (pattern, value) in self.segments.iter().zip(actual) {
            if let Some(name) = param_name(pattern) {
                params.insert(name.to_string(), Value::String(percent_decode(value)));
            }
        }
        params
    }
}

impl fmt::Display for RoutePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// One discovered route, immutable once registered.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub method: HttpMethod,
    pub prefix: RoutePrefix,
    pub handler: Handler,
    /// Hooks declared by the route file itself.
    pub hooks: HookSet,
    pub schema: Option<RouteSchema>,
    /// File the route was loaded from.
    pub source: PathBuf,
}

/// Hook registered against a directory scope.
#[derive(Debug, Clone)]
struct ScopeHook {
    scope: RoutePrefix,
    name: HookName,
    hook: Hook,
}

/// Registrar that keeps everything in memory for the HTTP adapter.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    scope_hooks: Vec<ScopeHook>,
    routes: Vec<RouteDefinition>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find a route by method and displayed path, e.g. `/users/:id`.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&RouteDefinition> {
        let prefix = RoutePrefix::parse(path);
        self.routes
            .iter()
            .find(|r| r.method == method && r.prefix == prefix)
    }

    /// Scope hooks of every enclosing directory, then the route's own hooks.
    pub fn effective_hooks(&self, route: &RouteDefinition) -> HookSet {
        let mut hooks = HookSet::new();
        for scoped in &self.scope_hooks {
            if scoped.scope.contains(&route.prefix) {
                hooks.push(scoped.name, scoped.hook.clone());
            }
        }
        hooks.extend(route.hooks.clone());
        hooks
    }

    /// Tree rendering of all routes with their methods.
    pub fn listing(&self) -> String {
        #[derive(Default)]
        struct Node<'a> {
            methods: Vec<HttpMethod>,
            children: BTreeMap<&'a str, Node<'a>>,
        }

        fn render(node: &Node<'_>, indent: &str, out: &mut String) {
            let count = node.children.len();
            for (i, (name, child)) in node.children.iter().enumerate() {
                let last = i + 1 == count;
                out.push_str(indent);
                out.push_str(if last { "└── " } else { "├── " });
                out.push_str(name);
                push_methods(&child.methods, out);
                out.push('\n');
                let next = format!("{}{}", indent, if last { "    " } else { "│   " });
                render(child, &next, out);
            }
        }

        fn push_methods(methods: &[HttpMethod], out: &mut String) {
            if methods.is_empty() {
                return;
            }
            let mut methods = methods.to_vec();
            methods.sort();
            let names: Vec<&str> = methods.iter().map(HttpMethod::as_str).collect();
            out.push_str(" (");
            out.push_str(&names.join(", "));
            out.push(')');
        }

        let mut root = Node::default();
        for route in &self.routes {
            let mut node = &mut root;
            for segment in route.prefix.segments() {
                node = node.children.entry(segment.as_str()).or_default();
            }
            node.methods.push(route.method);
        }

        let mut out = String::from("/");
        push_methods(&root.methods, &mut out);
        out.push('\n');
        render(&root, "", &mut out);
        out
    }
}

impl RouteRegistrar for RouteTable {
    fn add_hook(&mut self, scope: &RoutePrefix, name: HookName, hook: Hook) -> Result<(), RegistrationError> {
        self.scope_hooks.push(ScopeHook {
            scope: scope.clone(),
            name,
            hook,
        });
        Ok(())
    }

    fn route(&mut self, route: RouteDefinition) -> Result<(), RegistrationError> {
        if let Some((segment, reason)) = route.prefix.invalid_segment() {
            return Err(RegistrationError::InvalidSegment {
                segment: segment.to_string(),
                path: route.prefix.to_string(),
                reason,
            });
        }
        if self
            .routes
            .iter()
            .any(|r| r.method == route.method && r.prefix == route.prefix)
        {
            return Err(RegistrationError::Duplicate {
                method: route.method,
                path: route.prefix.to_string(),
            });
        }
        if let Some(existing) = self
            .routes
            .iter()
            .find(|r| r.prefix.param_conflict(&route.prefix))
        {
            return Err(RegistrationError::ParamConflict {
                path: route.prefix.to_string(),
                existing: existing.prefix.to_string(),
            });
        }
        self.routes.push(route);
        Ok(())
    }
}
