//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs     (Axum setup, request ID, body limit, method dispatch)
//!     → lifecycle.rs  (hooks, body parsing, handler, reply)
//!     → validation.rs (route schema checks)
//!     → exchange.rs   (reply → response)
//!     → Send to client
//! ```

pub mod exchange;
pub mod handler;
pub mod lifecycle;
pub mod request;
pub mod server;
pub mod validation;

pub use exchange::{Exchange, Reply, ReplyBody, RequestError};
pub use handler::{Handler, Hook};
pub use lifecycle::Limits;
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ReloadHandle};
