//! Reading route and setting files into module records.
//!
//! # Data Flow
//! ```text
//! get.toml / setting.json
//!     → ModuleFormat (by extension)
//!     → toml / serde_json parse
//!     → ModuleRecord (top-level keys in declaration order)
//! ```
//!
//! # Design Decisions
//! - TOML is converted to a JSON value so both formats share one record type
//! - The cache is a plain value owned by one directory pass; dropping it
//!   releases everything loaded at that level

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::routing::error::LoadError;

/// File formats a module can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    Toml,
    Json,
}

impl ModuleFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "toml" => Some(ModuleFormat::Toml),
            "json" => Some(ModuleFormat::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// The exported members of one loaded file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleRecord {
    /// File the record was loaded from; nested groups share their parent's.
    pub path: PathBuf,
    pub exports: Map<String, Value>,
}

impl ModuleRecord {
    pub fn new(path: impl Into<PathBuf>, exports: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            exports,
        }
    }

    /// Parse module source text in the given format.
    pub fn parse(path: &Path, format: ModuleFormat, source: &str) -> Result<Self, LoadError> {
        let value = match format {
            ModuleFormat::Toml => {
                let table: toml::Table = toml::from_str(source).map_err(|e| LoadError::Toml {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                serde_json::to_value(table).map_err(|e| LoadError::Json {
                    path: path.to_path_buf(),
                    source: e,
                })?
            }
            ModuleFormat::Json => serde_json::from_str(source).map_err(|e| LoadError::Json {
                path: path.to_path_buf(),
                source: e,
            })?,
        };

        match value {
            Value::Object(exports) => Ok(Self::new(path, exports)),
            _ => Err(LoadError::InvalidModule {
                path: path.to_path_buf(),
                reason: "top level must be a table".to_string(),
            }),
        }
    }

    /// Read and parse a module file.
    pub async fn load(path: &Path) -> Result<Self, LoadError> {
        let format = ModuleFormat::from_path(path).ok_or_else(|| LoadError::InvalidModule {
            path: path.to_path_buf(),
            reason: "unrecognized module extension".to_string(),
        })?;
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LoadError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::parse(path, format, &source)
    }

    /// A `$` group nested in this module, sharing its source path.
    pub fn group(&self, exports: Map<String, Value>) -> Self {
        Self::new(self.path.clone(), exports)
    }
}

/// Loaded modules keyed by file path, scoped to one directory pass.
#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: HashMap<PathBuf, Arc<ModuleRecord>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached record for `path`, loading it on first use.
    pub async fn get_or_load(&mut self, path: &Path) -> Result<Arc<ModuleRecord>, LoadError> {
        if let Some(module) = self.modules.get(path) {
            return Ok(module.clone());
        }
        let module = Arc::new(ModuleRecord::load(path).await?);
        self.modules.insert(path.to_path_buf(), module.clone());
        Ok(module)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
