//! Routing subsystem: turning a directory tree into registered routes.
//!
//! # Data Flow
//! ```text
//! routes/                       (directory tree)
//!     → loader.rs     (walk, one directory at a time)
//!     → classify.rs   (entry name → Directory | Setting | Handler | Skip)
//!     → module.rs     (read TOML/JSON into a ModuleRecord, per-directory cache)
//!     → settings.rs   (hooks + schema fragments, registry name resolution)
//!     → RouteRegistrar (scope hooks, then routes)
//!     → table.rs      (RouteTable consumed by the HTTP adapter)
//! ```
//!
//! # Design Decisions
//! - Routes are discovered once per load and immutable afterwards
//! - Unsupported names and keys are warnings; everything else is a hard error
//! - Hook order: ancestor directories, then the file, then its `$` groups

pub mod classify;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod method;
pub mod module;
pub mod schema;
pub mod settings;
pub mod table;
pub mod watcher;

pub use classify::{Conventions, EntryKind};
pub use error::{LoadError, LoadWarning, RegistrationError};
pub use hooks::{HookName, HookSet};
pub use loader::{LoadReport, RouteLoader, RouteRegistrar};
pub use method::HttpMethod;
pub use schema::{RouteSchema, SchemaFragment, SchemaTarget};
pub use settings::Settings;
pub use table::{RouteDefinition, RoutePrefix, RouteTable};
