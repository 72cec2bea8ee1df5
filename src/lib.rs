//! Convention-based HTTP routing loader.
//!
//! A directory tree of declarative route files becomes a set of HTTP routes:
//! directories are path segments, files named after HTTP methods are
//! handlers, and `setting` files attach lifecycle hooks and schema fragments
//! to everything below them.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod routing;

pub use config::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::Registry;
pub use routing::{RouteLoader, RouteRegistrar, RouteTable};
