//! Collecting hooks and schema fragments from module records.
//!
//! # Responsibilities
//! - Resolve hook and handler names against the registry
//! - Walk `$` setting groups recursively
//! - Report unrecognized keys and unchecked schema keywords as warnings
//!
//! # Design Decisions
//! - `Settings::merge` is plain concatenation, so it is associative with
//!   `Settings::default()` as identity
//! - A module's own hooks come before the hooks of its `$` groups; groups
//!   follow in declaration order, depth first

use serde_json::{Map, Value};

use crate::http::handler::{Handler, Hook};
use crate::http::validation::unsupported_keywords;
use crate::registry::Registry;
use crate::routing::error::{LoadError, LoadWarning};
use crate::routing::hooks::{HookName, HookSet};
use crate::routing::module::ModuleRecord;
use crate::routing::schema::{merge_fragments, RouteSchema, SchemaFragment};

/// Marker prefix for nested setting groups.
pub const GROUP_MARKER: char = '$';
pub const SCHEMA_KEY: &str = "schema";
pub const DEFAULT_KEY: &str = "default";

/// Hooks and schema fragments contributed at one scope.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub hooks: HookSet,
    pub schema: Vec<SchemaFragment>,
}

impl Settings {
    /// Concatenate `other` after `self`.
    pub fn merge(mut self, other: Settings) -> Settings {
        self.hooks.extend(other.hooks);
        self.schema.extend(other.schema);
        self
    }
}

/// A route file after parsing.
#[derive(Debug, Clone)]
pub struct ParsedHandler {
    pub handler: Handler,
    pub hooks: HookSet,
    pub schema: Option<RouteSchema>,
}

/// Parse a setting file (or a `$` group).
pub fn parse_setting(
    module: &ModuleRecord,
    registry: &Registry,
    warnings: &mut Vec<LoadWarning>,
) -> Result<Settings, LoadError> {
    collect(module, registry, warnings, false)
}

/// Parse a route file. `inherited` is the schema list of ancestor directories.
pub fn parse_handler(
    module: &ModuleRecord,
    inherited: &[SchemaFragment],
    registry: &Registry,
    warnings: &mut Vec<LoadWarning>,
) -> Result<ParsedHandler, LoadError> {
    let settings = collect(module, registry, warnings, true)?;

    let name = match module.exports.get(DEFAULT_KEY) {
        Some(Value::String(name)) => name,
        Some(_) => {
            return Err(LoadError::InvalidModule {
                path: module.path.clone(),
                reason: "`default` must be a handler name".to_string(),
            })
        }
        None => {
            return Err(LoadError::MissingHandler {
                path: module.path.clone(),
            })
        }
    };
    let handler = registry
        .get_handler(name)
        .cloned()
        .ok_or_else(|| LoadError::UnknownHandler {
            path: module.path.clone(),
            name: name.clone(),
        })?;

    let schema = merge_fragments(settings.schema.iter().chain(inherited.iter()));

    Ok(ParsedHandler {
        handler,
        hooks: settings.hooks,
        schema,
    })
}

fn collect(
    module: &ModuleRecord,
    registry: &Registry,
    warnings: &mut Vec<LoadWarning>,
    allow_default: bool,
) -> Result<Settings, LoadError> {
    let mut own = Settings::default();
    let mut groups = Vec::new();
    let mut invalid = Vec::new();

    for (key, value) in &module.exports {
        if key.starts_with(GROUP_MARKER) {
            groups.push((key, value));
        } else if key == SCHEMA_KEY {
            own.schema.push(parse_schema(module, value, warnings)?);
        } else if let Ok(hook) = key.parse::<HookName>() {
            for resolved in resolve_hooks(module, hook, value, registry)? {
                own.hooks.push(hook, resolved);
            }
        } else if !(allow_default && key == DEFAULT_KEY) {
            invalid.push(key.clone());
        }
    }

    if !invalid.is_empty() {
        let warning = LoadWarning::InvalidKeys {
            path: module.path.clone(),
            keys: invalid,
        };
        tracing::warn!("{}", warning);
        warnings.push(warning);
    }

    let mut settings = own;
    for (key, value) in groups {
        let exports = group_exports(module, key, value)?;
        let nested = collect(&module.group(exports), registry, warnings, false)?;
        settings = settings.merge(nested);
    }
    Ok(settings)
}

fn parse_schema(
    module: &ModuleRecord,
    value: &Value,
    warnings: &mut Vec<LoadWarning>,
) -> Result<SchemaFragment, LoadError> {
    let (fragment, unknown) =
        SchemaFragment::from_json(value).map_err(|reason| LoadError::InvalidModule {
            path: module.path.clone(),
            reason,
        })?;
    if !unknown.is_empty() {
        let warning = LoadWarning::UnknownSchemaTargets {
            path: module.path.clone(),
            targets: unknown,
        };
        tracing::warn!("{}", warning);
        warnings.push(warning);
    }
    for (target, schema) in fragment.iter() {
        let keywords = unsupported_keywords(schema).map_err(|reason| LoadError::InvalidModule {
            path: module.path.clone(),
            reason: format!("schema.{}: {}", target, reason),
        })?;
        if !keywords.is_empty() {
            let warning = LoadWarning::UnsupportedSchemaKeywords {
                path: module.path.clone(),
                target,
                keywords,
            };
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }
    }
    Ok(fragment)
}

/// A hook key holds one registry name or an array of names.
fn resolve_hooks(
    module: &ModuleRecord,
    hook: HookName,
    value: &Value,
    registry: &Registry,
) -> Result<Vec<Hook>, LoadError> {
    let names: Vec<&str> = match value {
        Value::String(name) => vec![name.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| LoadError::InvalidModule {
                    path: module.path.clone(),
                    reason: format!("`{}` entries must be hook names", hook),
                })
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(LoadError::InvalidModule {
                path: module.path.clone(),
                reason: format!("`{}` must be a hook name or a list of hook names", hook),
            })
        }
    };

    names
        .into_iter()
        .map(|name| {
            registry
                .get_hook(name)
                .cloned()
                .ok_or_else(|| LoadError::UnknownHook {
                    path: module.path.clone(),
                    hook,
                    name: name.to_string(),
                })
        })
        .collect()
}

fn group_exports(module: &ModuleRecord, key: &str, value: &Value) -> Result<Map<String, Value>, LoadError> {
    match value {
        Value::Object(exports) => Ok(exports.clone()),
        _ => Err(LoadError::InvalidModule {
            path: module.path.clone(),
            reason: format!("setting group `{}` must be a table", key),
        }),
    }
}
