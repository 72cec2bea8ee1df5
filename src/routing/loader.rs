//! Directory-to-route loading.
//!
//! # Responsibilities
//! - Walk a route tree depth first
//! - Register a directory's setting hooks against its scope before anything
//!   below it
//! - Register one route per handler file with its merged hooks and schema
//!
//! # Design Decisions
//! - Entries are visited in name order so loads are reproducible
//! - Sub-directories are loaded to completion before the next sibling; any
//!   hard failure aborts the whole load
//! - The module cache lives for exactly one directory pass

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::handler::Hook;
use crate::registry::Registry;
use crate::routing::classify::{Conventions, EntryKind};
use crate::routing::error::{LoadError, LoadWarning, RegistrationError};
use crate::routing::hooks::HookName;
use crate::routing::module::ModuleCache;
use crate::routing::schema::SchemaFragment;
use crate::routing::settings::{parse_handler, parse_setting};
use crate::routing::table::{RouteDefinition, RoutePrefix};

/// Capability the loader registers routes and scope hooks with.
pub trait RouteRegistrar: Send {
    /// Attach `hook` to every route at or below `scope`.
    fn add_hook(&mut self, scope: &RoutePrefix, name: HookName, hook: Hook) -> Result<(), RegistrationError>;

    /// Register one route.
    fn route(&mut self, route: RouteDefinition) -> Result<(), RegistrationError>;
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub routes: usize,
    pub directories: usize,
    pub warnings: Vec<LoadWarning>,
}

/// Loads route trees using a set of naming conventions and a registry.
#[derive(Debug, Clone)]
pub struct RouteLoader {
    conventions: Conventions,
    registry: Arc<Registry>,
}

struct DirEntryInfo {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

impl RouteLoader {
    pub fn new(conventions: Conventions, registry: Arc<Registry>) -> Self {
        Self {
            conventions,
            registry,
        }
    }

    /// Load the tree under `root`, mounting it at `prefix`.
    ///
    /// `inherited` is a schema list applied to every route of the tree.
    pub async fn load<R: RouteRegistrar>(
        &self,
        root: &Path,
        prefix: RoutePrefix,
        inherited: Vec<SchemaFragment>,
        registrar: &mut R,
    ) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();
        self.load_dir(root.to_path_buf(), prefix, inherited, registrar, &mut report)
            .await?;
        tracing::info!(
            root = %root.display(),
            routes = report.routes,
            directories = report.directories,
            warnings = report.warnings.len(),
            "Route tree loaded"
        );
        Ok(report)
    }

    fn load_dir<'a, R: RouteRegistrar>(
        &'a self,
        dir: PathBuf,
        prefix: RoutePrefix,
        mut schema: Vec<SchemaFragment>,
        registrar: &'a mut R,
        report: &'a mut LoadReport,
    ) -> BoxFuture<'a, Result<(), LoadError>> {
        Box::pin(async move {
            report.directories += 1;
            let mut cache = ModuleCache::new();
            let entries = self.read_entries(&dir, report).await?;

            tracing::debug!(dir = %dir.display(), prefix = %prefix, entries = entries.len(), "Loading directory");

            let mut settings = entries
                .iter()
                .filter(|e| self.conventions.classify(&e.name, e.is_dir) == EntryKind::Setting);
            if let Some(setting) = settings.next() {
                let module = cache.get_or_load(&setting.path).await?;
                let parsed = parse_setting(&module, &self.registry, &mut report.warnings)?;
                for (name, hooks) in parsed.hooks.iter() {
                    for hook in hooks {
                        registrar
                            .add_hook(&prefix, name, hook.clone())
                            .map_err(|source| LoadError::Registration {
                                path: setting.path.clone(),
                                source,
                            })?;
                    }
                }
                schema.extend(parsed.schema);
            }
            for extra in settings {
                let warning = LoadWarning::ExtraSetting {
                    path: extra.path.clone(),
                };
                tracing::warn!("{}", warning);
                report.warnings.push(warning);
            }

            for entry in &entries {
                match self.conventions.classify(&entry.name, entry.is_dir) {
                    EntryKind::Skip | EntryKind::Setting => {}
                    EntryKind::Directory => {
                        self.load_dir(
                            entry.path.clone(),
                            prefix.join(&entry.name),
                            schema.clone(),
                            &mut *registrar,
                            &mut *report,
                        )
                        .await?;
                    }
                    EntryKind::Handler(method) => {
                        let module = cache.get_or_load(&entry.path).await?;
                        let parsed = parse_handler(&module, &schema, &self.registry, &mut report.warnings)?;
                        let route = RouteDefinition {
                            method,
                            prefix: prefix.clone(),
                            handler: parsed.handler,
                            hooks: parsed.hooks,
                            schema: parsed.schema,
                            source: entry.path.clone(),
                        };
                        tracing::debug!(method = %method, path = %prefix, file = %entry.path.display(), "Registering route");
                        registrar.route(route).map_err(|source| LoadError::Registration {
                            path: entry.path.clone(),
                            source,
                        })?;
                        report.routes += 1;
                    }
                    EntryKind::Unsupported(method) => {
                        let warning = LoadWarning::UnsupportedMethod {
                            path: entry.path.clone(),
                            method,
                        };
                        tracing::warn!("{}", warning);
                        report.warnings.push(warning);
                    }
                }
            }

            drop(cache);
            Ok(())
        })
    }

    async fn read_entries(&self, dir: &Path, report: &mut LoadReport) -> Result<Vec<DirEntryInfo>, LoadError> {
        let io_err = |source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut read_dir = tokio::fs::read_dir(dir).await.map_err(io_err)?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => {
                    let warning = LoadWarning::NonUtf8Name { path };
                    tracing::warn!("{}", warning);
                    report.warnings.push(warning);
                    continue;
                }
            };
            if name.contains(&self.conventions.skip_marker) {
                continue;
            }
            // Does not follow symlinks.
            let is_dir = entry.file_type().await.map_err(io_err)?.is_dir();
            entries.push(DirEntryInfo { name, path, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
