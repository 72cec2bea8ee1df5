//! Route loading errors and warnings.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::routing::hooks::HookName;
use crate::routing::method::HttpMethod;
use crate::routing::schema::SchemaTarget;

/// Rejection returned by a `RouteRegistrar`.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The same method is already registered for this path.
    #[error("route {method} {path} is already registered")]
    Duplicate { method: HttpMethod, path: String },

    /// Two routes differ only in parameter names, e.g. `/users/:id` and `/users/:name`.
    #[error("route {path} conflicts with {existing}")]
    ParamConflict { path: String, existing: String },

    /// A path segment the HTTP router cannot express, e.g. `*rest` or `a{b`.
    #[error("route {path}: segment `{segment}` is invalid: {reason}")]
    InvalidSegment {
        segment: String,
        path: String,
        reason: &'static str,
    },

    #[error("registration rejected: {0}")]
    Rejected(String),
}

/// Hard failures that abort the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid module {path}: {reason}")]
    InvalidModule { path: PathBuf, reason: String },

    #[error("{path}: handler `{name}` is not registered")]
    UnknownHandler { path: PathBuf, name: String },

    #[error("{path}: {hook} hook `{name}` is not registered")]
    UnknownHook {
        path: PathBuf,
        hook: HookName,
        name: String,
    },

    #[error("{path}: route file has no `default` handler")]
    MissingHandler { path: PathBuf },

    #[error("{path}: {source}")]
    Registration {
        path: PathBuf,
        #[source]
        source: RegistrationError,
    },
}

/// Non-fatal anomaly found while loading; the offending item is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// A file name that is not a supported method.
    UnsupportedMethod { path: PathBuf, method: String },
    /// Module keys that are neither hooks, `schema`, `default` nor `$` groups.
    InvalidKeys { path: PathBuf, keys: Vec<String> },
    /// Schema keys that are not validation targets.
    UnknownSchemaTargets { path: PathBuf, targets: Vec<String> },
    /// Schema keywords request validation does not check.
    UnsupportedSchemaKeywords {
        path: PathBuf,
        target: SchemaTarget,
        keywords: Vec<String>,
    },
    /// A second setting file in one directory.
    ExtraSetting { path: PathBuf },
    /// An entry whose name is not valid UTF-8.
    NonUtf8Name { path: PathBuf },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::UnsupportedMethod { path, method } => {
                write!(f, "method {} is not supported ({})", method, path.display())
            }
            LoadWarning::InvalidKeys { path, keys } => {
                write!(f, "invalid key: {} ({})", keys.join(","), path.display())
            }
            LoadWarning::UnknownSchemaTargets { path, targets } => {
                write!(f, "unknown schema target: {} ({})", targets.join(","), path.display())
            }
            LoadWarning::UnsupportedSchemaKeywords { path, target, keywords } => {
                write!(
                    f,
                    "schema.{} keywords are not checked: {} ({})",
                    target,
                    keywords.join(","),
                    path.display()
                )
            }
            LoadWarning::ExtraSetting { path } => {
                write!(f, "ignoring extra setting file {}", path.display())
            }
            LoadWarning::NonUtf8Name { path } => {
                write!(f, "ignoring non UTF-8 entry {}", path.display())
            }
        }
    }
}
