//! End-to-end tests across the MCP transports

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use svcmgr_core::{ServiceType, SessionConfig};
use svcmgr_managers::testing::ScriptedRunner;
use svcmgr_managers::{DockerManager, Provider, ServiceRegistry, SystemdManager};
use svcmgr_mcp::transport::{sse, stream};
use svcmgr_mcp::{McpHandler, McpServer, SessionTable, StdioTransport, StreamingState};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const BASE_URL: &str = "http://localhost:8080";

fn handler(runner: ScriptedRunner) -> Arc<dyn McpHandler> {
    let runner = runner.into_arc();
    let registry = ServiceRegistry::new()
        .with_provider(Provider::Systemd(SystemdManager::new(runner.clone())))
        .with_provider(Provider::Docker(DockerManager::new(runner)));
    Arc::new(McpServer::new(Arc::new(registry)))
}

fn streaming_state() -> StreamingState {
    streaming_state_with(SessionConfig::default())
}

fn streaming_state_with(config: SessionConfig) -> StreamingState {
    let sessions = SessionTable::new(handler(ScriptedRunner::new()), config, CancellationToken::new());
    StreamingState::new(sessions, vec![ServiceType::Systemd, ServiceType::Docker], BASE_URL)
}

/// Reads `event:`/`data:` pairs off an SSE response body
struct EventReader {
    body: Body,
    buffer: String,
}

impl EventReader {
    fn new(body: Body) -> Self {
        Self {
            body,
            buffer: String::new(),
        }
    }

    async fn next(&mut self) -> (String, String) {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let mut name = String::new();
                let mut data = String::new();
                for line in block.lines() {
                    if let Some(v) = line.strip_prefix("event:") {
                        name = v.trim().to_string();
                    } else if let Some(v) = line.strip_prefix("data:") {
                        data = v.trim().to_string();
                    }
                }
                return (name, data);
            }
            let frame = tokio::time::timeout(Duration::from_secs(5), self.body.frame())
                .await
                .expect("timed out waiting for an event")
                .expect("stream ended")
                .unwrap();
            if let Ok(chunk) = frame.into_data() {
                self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        }
    }
}

async fn read_chunk(body: &mut Body) -> Option<Bytes> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("timed out waiting for body")?
            .unwrap();
        if let Ok(data) = frame.into_data() {
            if !data.is_empty() {
                return Some(data);
            }
        }
    }
}

#[tokio::test]
async fn test_initialize_over_stdio() {
    let (mut client, server_io) = tokio::io::duplex(4096);
    let (server_read, server_write) = tokio::io::split(server_io);

    let transport = StdioTransport::new(CancellationToken::new());
    let task = tokio::spawn(async move {
        transport
            .serve_io(handler(ScriptedRunner::new()), BufReader::new(server_read), server_write)
            .await
    });

    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n")
        .await
        .unwrap();
    let (client_read, mut client_write) = tokio::io::split(client);
    let mut lines = BufReader::new(client_read).lines();
    let line = lines.next_line().await.unwrap().unwrap();

    assert!(line.contains("\"protocolVersion\":\"2024-11-05\""));
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "Linux Service Manager");
    assert!(response["result"]["serverInfo"]["version"].is_string());
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["prompts"].is_object());

    client_write.shutdown().await.unwrap();
    drop(client_write);
    drop(lines);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_auto_detect_on_get_status() {
    let runner = ScriptedRunner::new()
        .ok("systemctl is-active api", "inactive\n")
        .ok(
            "systemctl show api --property=LoadState,MainPID,Description,ActiveEnterTimestamp",
            "LoadState=not-found\n",
        )
        .ok(
            "docker inspect api",
            r#"[{"State":{"Running":true,"Pid":321,"StartedAt":"2024-01-15T10:30:00Z"},"Config":{"Image":"api:latest"}}]"#,
        )
        .into_arc();
    let registry = ServiceRegistry::new()
        .with_provider(Provider::Systemd(SystemdManager::new(runner.clone())))
        .with_provider(Provider::Docker(DockerManager::new(runner.clone())));
    let server = McpServer::new(Arc::new(registry));

    let request = svcmgr_mcp::McpRequest::new("tools/call")
        .with_id(3)
        .with_params(json!({"name": "get_service_status", "arguments": {"service_name": "api"}}));
    let response = server.handle_request(request).await.unwrap();
    let result = response.result.unwrap();

    assert_eq!(result["isError"], false);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("**Type**: docker\n"));
    assert!(text.contains("**PID**: 321\n"));
    assert!(runner.was_called("systemctl is-active api"));
}

#[tokio::test]
async fn test_unknown_tool_is_tool_error() {
    let request = svcmgr_mcp::McpRequest::new("tools/call")
        .with_id(4)
        .with_params(json!({"name": "nope", "arguments": {}}));
    let response = handler(ScriptedRunner::new()).handle_request(request).await.unwrap();

    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"].as_str().unwrap().starts_with("Error: "));
}

#[tokio::test]
async fn test_sse_session() {
    let app: Router = sse::router(streaming_state());

    let response = app
        .clone()
        .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let client_id = response.headers()["x-mcp-client-id"].to_str().unwrap().to_string();

    let mut events = EventReader::new(response.into_body());
    let (name, data) = events.next().await;
    assert_eq!(name, "connected");
    let connected: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(connected["clientId"], client_id.as_str());

    let (name, endpoint) = events.next().await;
    assert_eq!(name, "endpoint");
    assert_eq!(endpoint, format!("{}/message?session={}", BASE_URL, client_id));
    let path = endpoint.strip_prefix(BASE_URL).unwrap().to_string();

    let post = Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#))
        .unwrap();
    let ack = app.clone().oneshot(post).await.unwrap();
    assert_eq!(ack.status(), StatusCode::ACCEPTED);

    let (name, data) = events.next().await;
    assert_eq!(name, "message");
    let message: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(message["id"], 7);
    assert_eq!(message["result"]["tools"].as_array().unwrap().len(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_sse_heartbeat_reaches_the_wire() {
    let config = SessionConfig {
        heartbeat_secs: 2,
        ..SessionConfig::default()
    };
    let app: Router = sse::router(streaming_state_with(config));
    let response = app
        .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut events = EventReader::new(response.into_body());
    assert_eq!(events.next().await.0, "connected");
    assert_eq!(events.next().await.0, "endpoint");

    let (name, data) = events.next().await;
    assert_eq!(name, "heartbeat");
    let beat: Value = serde_json::from_str(&data).unwrap();
    assert!(beat["timestamp"].is_string());

    assert_eq!(events.next().await.0, "heartbeat");
}

#[tokio::test]
async fn test_sse_legacy_post_path() {
    let app: Router = sse::router(streaming_state());
    let response = app
        .clone()
        .oneshot(Request::get("/mcp/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let client_id = response.headers()["x-mcp-client-id"].to_str().unwrap().to_string();
    let mut events = EventReader::new(response.into_body());
    events.next().await;
    events.next().await;

    let post = Request::post("/mcp/messages")
        .header("x-mcp-client-id", client_id.as_str())
        .body(Body::from(r#"{"jsonrpc":"2.0","id":"p1","method":"ping"}"#))
        .unwrap();
    let ack = app.clone().oneshot(post).await.unwrap();
    assert_eq!(ack.status(), StatusCode::OK);
    let body = ack.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"success": true, "messageId": "p1"}));

    let (name, data) = events.next().await;
    assert_eq!(name, "response");
    assert_eq!(serde_json::from_str::<Value>(&data).unwrap()["id"], "p1");
}

#[tokio::test]
async fn test_sse_unknown_session() {
    let app: Router = sse::router(streaming_state());

    let post = Request::post("/message?session=client_missing")
        .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
        .unwrap();
    assert_eq!(app.clone().oneshot(post).await.unwrap().status(), StatusCode::NOT_FOUND);

    let post = Request::post("/message")
        .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
        .unwrap();
    assert_eq!(app.clone().oneshot(post).await.unwrap().status(), StatusCode::NOT_FOUND);

    let post = Request::post("/mcp/messages")
        .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
        .unwrap();
    assert_eq!(app.oneshot(post).await.unwrap().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sse_closing_stream_removes_session() {
    let state = streaming_state();
    let app: Router = sse::router(state.clone());
    let response = app
        .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(state.sessions.len(), 1);

    drop(response);
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_ndjson_bidirectional() {
    let state = streaming_state();
    let app: Router = stream::router(state.clone());

    let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, Infallible>>();
    let open = Request::post("/mcp/stream")
        .header("upgrade", "mcp-stream")
        .body(Body::from_stream(rx))
        .unwrap();
    let opened = app.clone().oneshot(open).await.unwrap();
    assert_eq!(opened.status(), StatusCode::OK);
    assert_eq!(opened.headers()["content-type"], "application/x-ndjson");
    let session_id = opened.headers()["x-mcp-session-id"].to_str().unwrap().to_string();
    assert!(session_id.starts_with("stream_"));

    let subscribe = || Request::get(format!("/mcp/stream/{}", session_id)).body(Body::empty()).unwrap();
    let subscribed = app.clone().oneshot(subscribe()).await.unwrap();
    assert_eq!(subscribed.status(), StatusCode::OK);
    assert_eq!(
        app.clone().oneshot(subscribe()).await.unwrap().status(),
        StatusCode::CONFLICT
    );

    tx.unbounded_send(Ok(Bytes::from_static(
        b"{\"jsonrpc\":\"2.0\",\"id\":\"abc\",\"method\":\"ping\"}\n",
    )))
    .unwrap();

    let mut body = subscribed.into_body();
    let chunk = read_chunk(&mut body).await.unwrap();
    let text = std::str::from_utf8(&chunk).unwrap();
    assert!(text.ends_with('\n'));
    let response: Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(response["id"], "abc");
    assert_eq!(response["result"], json!({}));

    // EOF on the request body ends the response stream and the session
    drop(tx);
    assert!(read_chunk(&mut body).await.is_none());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(state.sessions.get(&session_id).is_none());
}

#[tokio::test]
async fn test_ndjson_parse_error_frame() {
    let app: Router = stream::router(streaming_state());

    let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, Infallible>>();
    let open = Request::post("/mcp/stream")
        .header("connection", "upgrade")
        .body(Body::from_stream(rx))
        .unwrap();
    let opened = app.clone().oneshot(open).await.unwrap();
    let session_id = opened.headers()["x-mcp-session-id"].to_str().unwrap().to_string();

    let get = Request::get(format!("/mcp/stream/{}", session_id)).body(Body::empty()).unwrap();
    let mut body = app.oneshot(get).await.unwrap().into_body();

    tx.unbounded_send(Ok(Bytes::from_static(b"{broken\n"))).unwrap();
    let chunk = read_chunk(&mut body).await.unwrap();
    let response: Value = serde_json::from_slice(&chunk).unwrap();
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["error"]["code"], -32700);
}

#[tokio::test]
async fn test_ndjson_single_shot_and_unknown_session() {
    let app: Router = stream::router(streaming_state());

    let post = Request::post("/mcp/stream")
        .body(Body::from(r#"{"jsonrpc":"2.0","id":5,"method":"prompts/list"}"#))
        .unwrap();
    let response = app.clone().oneshot(post).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["id"], 5);
    assert_eq!(body["result"]["prompts"].as_array().unwrap().len(), 2);

    let post = Request::post("/mcp/stream").body(Body::from("not json")).unwrap();
    assert_eq!(app.clone().oneshot(post).await.unwrap().status(), StatusCode::BAD_REQUEST);

    let get = Request::get("/mcp/stream/stream_unknown").body(Body::empty()).unwrap();
    assert_eq!(app.oneshot(get).await.unwrap().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_streaming_health() {
    let app: Router = stream::router(streaming_state());
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["mode"], "bidir-http");
    assert_eq!(body["sessions"], 0);
    assert_eq!(body["managers"], json!(["systemd", "docker"]));
}
