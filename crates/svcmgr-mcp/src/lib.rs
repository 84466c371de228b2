//! svcmgr-mcp: MCP Protocol Server
//!
//! Exposes the service registry as MCP tools and prompts.
//!
//! Architecture:
//! ```text
//! stdin/stdout ─┐
//! SSE + POST ───┼─→ McpHandler (McpServer) ─→ ServiceRegistry ─→ providers
//! NDJSON ───────┘
//! ```
//!
//! Methods:
//! - initialize / initialized / ping
//! - tools/list, tools/call
//! - prompts/list, prompts/get
//! - logging/setLevel

pub mod catalog;
pub mod format;
pub mod prompts;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

// Re-export main types
pub use protocol::{JsonRpcError, McpRequest, McpResponse};
pub use server::McpServer;
pub use session::SessionTable;
pub use transport::{McpHandler, StdioTransport, StreamingState};

/// MCP protocol revision spoken by this server
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "Linux Service Manager";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{McpHandler, McpRequest, McpResponse, McpServer, SessionTable, StdioTransport, StreamingState};
}
