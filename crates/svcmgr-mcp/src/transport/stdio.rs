//! Stdio Transport
//!
//! Standard MCP transport over stdin/stdout. Requests are handled one at a
//! time, so responses come out in input order.

use super::{dispatch_frame, McpHandler};
use crate::protocol::parse_error_response;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct StdioTransport {
    shutdown: CancellationToken,
}

impl StdioTransport {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    /// Serve on the process stdin/stdout until EOF or shutdown
    pub async fn serve(&self, handler: Arc<dyn McpHandler>) -> io::Result<()> {
        info!("Starting MCP stdio transport");
        self.serve_io(handler, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await?;
        info!("Stdio transport shutting down");
        Ok(())
    }

    pub async fn serve_io<R, W>(&self, handler: Arc<dyn McpHandler>, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read?,
            };
            if read == 0 {
                break;
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    debug!(request = %line, "Received request");
                    dispatch_frame(handler.as_ref(), line).await
                }
                Err(e) => {
                    warn!(error = %e, "Discarding non UTF-8 frame");
                    Some(parse_error_response(e.to_string()))
                }
            };
            let Some(response) = response else {
                continue;
            };

            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{McpRequest, McpResponse};
    use serde_json::{json, Value};

    struct Echo;

    #[async_trait::async_trait]
    impl McpHandler for Echo {
        async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
            Some(McpResponse::success(request.id?, json!(request.method)))
        }
    }

    async fn run(input: &str) -> Vec<Value> {
        let transport = StdioTransport::new(CancellationToken::new());
        let mut output = Vec::new();
        transport
            .serve_io(Arc::new(Echo), input.as_bytes(), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_line_per_response_in_order() {
        let out = run(concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"quiet\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"b\"}",
        ))
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], 1);
        assert_eq!(out[0]["result"], "a");
        assert_eq!(out[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let out = run("this is not json\n").await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], Value::Null);
        assert_eq!(out[0]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_the_loop() {
        let transport = StdioTransport::new(CancellationToken::new());
        let mut input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\"}\n".to_vec();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"b\"}\n");

        let mut output = Vec::new();
        transport
            .serve_io(Arc::new(Echo), input.as_slice(), &mut output)
            .await
            .unwrap();

        let out: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["id"], 1);
        assert_eq!(out[1]["id"], Value::Null);
        assert_eq!(out[1]["error"]["code"], -32700);
        assert_eq!(out[2]["id"], 2);
        assert_eq!(out[2]["result"], "b");
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_a_pending_read() {
        let shutdown = CancellationToken::new();
        let transport = StdioTransport::new(shutdown.clone());
        let (reader, _keep_open) = tokio::io::duplex(64);

        let serve = tokio::spawn(async move {
            let mut output = Vec::new();
            transport
                .serve_io(Arc::new(Echo), BufReader::new(reader), &mut output)
                .await
                .map(|_| output)
        });
        tokio::task::yield_now().await;
        shutdown.cancel();

        let output = tokio::time::timeout(std::time::Duration::from_secs(5), serve)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let transport = StdioTransport::new(shutdown);
        let (reader, _keep_open) = tokio::io::duplex(64);
        let mut output = Vec::new();
        transport
            .serve_io(Arc::new(Echo), BufReader::new(reader), &mut output)
            .await
            .unwrap();
        assert!(output.is_empty());
    }
}
