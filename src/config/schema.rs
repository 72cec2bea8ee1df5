//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::lifecycle::Limits;
use crate::routing::classify::Conventions;

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where routes are loaded from and how files are named.
    pub routes: RoutesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl RouterConfig {
    /// Per-request limits for the HTTP lifecycle.
    pub fn request_limits(&self) -> Limits {
        Limits {
            request_timeout: Duration::from_secs(self.timeouts.request_secs),
            max_body_bytes: self.limits.max_body_bytes,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route tree configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Directory the route tree is loaded from.
    pub root: PathBuf,

    /// URL prefix the tree is mounted at.
    pub prefix: String,

    /// Entries whose name contains this marker are ignored.
    pub skip_marker: String,

    /// File stem of directory setting files.
    pub setting_stem: String,

    /// Module file extensions, without the dot.
    pub extensions: Vec<String>,

    /// Reload the tree when files under `root` change.
    pub watch: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        let conventions = Conventions::default();
        Self {
            root: PathBuf::from("routes"),
            prefix: "/".to_string(),
            skip_marker: conventions.skip_marker,
            setting_stem: conventions.setting_stem,
            extensions: conventions.extensions,
            watch: false,
        }
    }
}

impl RoutesConfig {
    pub fn conventions(&self) -> Conventions {
        Conventions {
            skip_marker: self.skip_marker.clone(),
            setting_stem: self.setting_stem.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for the request phases) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
