//! svcmgr-http: HTTP server, middleware and REST API
//!
//! Every HTTP mode of the service goes through this crate. The REST API
//! lives in [`rest`]; the MCP streaming transports bring their own routers
//! and are wrapped by the same middleware stack and server.
//!
//! ```text
//! svcmgr binary
//!     └── svcmgr-http (this crate)
//!         ├── Middleware stack (CORS, tracing, compression, timeout)
//!         └── Router
//!             ├── rest-http   → rest::router()
//!             ├── sse-http    → svcmgr_mcp::transport::sse::router()
//!             └── bidir-http  → svcmgr_mcp::transport::stream::router()
//! ```

pub mod error;
pub mod middleware;
pub mod rest;
pub mod server;

// Re-export main types
pub use error::ApiError;
pub use middleware::{MiddlewareConfig, MiddlewareStack};
pub use rest::RestState;
pub use server::{HttpServer, HttpServerBuilder};

// Re-export axum so binaries compose routers against the same version
pub use axum;

/// Error types for the HTTP server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server binding error: {0}")]
    BindError(#[from] std::io::Error),

    #[error("Router configuration error: {0}")]
    RouterError(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Prelude for convenient imports by other crates
pub mod prelude {
    pub use super::middleware::{MiddlewareConfig, MiddlewareStack};
    pub use super::server::{HttpServer, HttpServerBuilder};
    pub use super::Result;
}
