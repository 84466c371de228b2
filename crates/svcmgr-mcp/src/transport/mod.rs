//! Transport Layer
//!
//! - Stdio: newline-delimited JSON on stdin/stdout
//! - SSE: server-sent events plus a POST endpoint per session
//! - Stream: bidirectional NDJSON over a long-lived POST and a GET
//!
//! Every transport funnels frames through the same [`McpHandler`].

pub mod sse;
pub mod stdio;
pub mod stream;

pub use stdio::StdioTransport;

use crate::protocol::{parse_request, McpRequest, McpResponse};
use crate::session::SessionTable;
use crate::McpServer;
use serde_json::{json, Value};
use std::sync::Arc;
use svcmgr_core::ServiceType;
use tracing::warn;

/// Response header carrying an SSE session id
pub const CLIENT_ID_HEADER: &str = "x-mcp-client-id";
/// Response header carrying an NDJSON session id
pub const SESSION_ID_HEADER: &str = "x-mcp-session-id";

/// Generic MCP handler for the transport layer
#[async_trait::async_trait]
pub trait McpHandler: Send + Sync {
    /// `None` for notifications
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse>;
}

#[async_trait::async_trait]
impl McpHandler for McpServer {
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        McpServer::handle_request(self, request).await
    }
}

/// Parse and dispatch one raw frame. Unparseable frames answer -32700.
pub async fn dispatch_frame(handler: &dyn McpHandler, frame: &str) -> Option<McpResponse> {
    match parse_request(frame) {
        Ok(request) => handler.handle_request(request).await,
        Err(response) => {
            warn!("Discarding unparseable frame");
            Some(response)
        }
    }
}

/// Shared state of the HTTP streaming transports
#[derive(Clone)]
pub struct StreamingState {
    pub sessions: Arc<SessionTable>,
    pub managers: Arc<[ServiceType]>,
    /// Externally reachable base URL, no trailing slash
    pub base_url: Arc<str>,
}

impl StreamingState {
    pub fn new(sessions: Arc<SessionTable>, managers: Vec<ServiceType>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            sessions,
            managers: managers.into(),
            base_url: base_url.trim_end_matches('/').into(),
        }
    }

    fn health(&self, mode: &str) -> Value {
        json!({
            "status": "healthy",
            "mode": mode,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "managers": self.managers.iter().map(ServiceType::as_str).collect::<Vec<_>>(),
            "sessions": self.sessions.len(),
        })
    }
}
