//! Bidirectional NDJSON Transport
//!
//! `POST /mcp/stream` with `Upgrade: mcp-stream` (or `Connection: upgrade`)
//! opens a session: each line of the request body is one request, and the
//! responses are read back line by line from `GET /mcp/stream/{id}`.
//! Without the upgrade headers the POST is a single request/response.

use super::{StreamingState, SESSION_ID_HEADER};
use crate::protocol::{parse_error_response, parse_request, McpResponse};
use crate::session::{FrameKind, Inbound, Outgoing, Session, STREAM_PREFIX};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NDJSON: &str = "application/x-ndjson";

/// Upper bound for a single-shot request body and for one streamed line
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub fn router(state: StreamingState) -> Router {
    Router::new()
        .route("/mcp/stream", post(stream_post))
        .route("/mcp/stream/:session_id", get(stream_get))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<StreamingState>) -> Json<Value> {
    Json(state.health("bidir-http"))
}

/// `Upgrade: mcp-stream` or a `Connection` header listing `upgrade`
pub fn is_stream_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let connection = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    upgrade.eq_ignore_ascii_case("mcp-stream")
        || connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

async fn stream_post(State(state): State<StreamingState>, headers: HeaderMap, body: Body) -> Response {
    if is_stream_upgrade(&headers) {
        open_stream(&state, body)
    } else {
        single_shot(&state, body).await
    }
}

fn open_stream(state: &StreamingState, body: Body) -> Response {
    let session = state.sessions.open(STREAM_PREFIX);
    let id = session.id().to_string();
    info!(session = %id, "NDJSON stream opened");
    tokio::spawn(read_requests(session.clone(), body));

    // Hold the response open for as long as the session lives
    let closed = session.token().clone().cancelled_owned();
    let hold = Body::from_stream(stream::pending::<Result<Bytes, Infallible>>().take_until(closed));

    (
        [
            (header::CONTENT_TYPE, NDJSON),
            (HeaderName::from_static(SESSION_ID_HEADER), id.as_str()),
        ],
        hold,
    )
        .into_response()
}

async fn single_shot(state: &StreamingState, body: Body) -> Response {
    let Ok(bytes) = axum::body::to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
    };
    let request = match std::str::from_utf8(&bytes).map(parse_request) {
        Ok(Ok(request)) => request,
        _ => return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response(),
    };

    match state.sessions.handler().handle_request(request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Split the request body into lines and queue each as a request. EOF
/// closes the session's inbound side.
async fn read_requests(session: Arc<Session>, body: Body) {
    let mut chunks = body.into_data_stream();
    let mut buffer = LineBuffer::new(MAX_BODY_BYTES);
    let mut lines = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = session.token().cancelled() => return,
            chunk = chunks.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                buffer.push(&bytes, &mut lines);
                for line in lines.drain(..) {
                    match line {
                        Line::Frame(raw) => submit_line(&session, &raw),
                        Line::Oversized => reject_oversized(&session),
                    }
                }
            }
            Some(Err(e)) => {
                warn!(session = %session.id(), error = %e, "Request stream failed");
                break;
            }
            None => break,
        }
    }

    if let Some(rest) = buffer.finish() {
        submit_line(&session, &rest);
    }
    session.close_inbound();
    debug!(session = %session.id(), "Request stream ended");
}

enum Line {
    Frame(Vec<u8>),
    /// A line passed the size limit and was dropped
    Oversized,
}

/// Newline splitter that never holds more than `limit` bytes of one line.
/// The remainder of an oversized line is skipped up to its newline.
struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl LineBuffer {
    fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
            discarding: false,
        }
    }

    fn push(&mut self, bytes: &[u8], out: &mut Vec<Line>) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.discarding {
                self.discarding = false;
            } else if line.len() > self.limit + 1 {
                out.push(Line::Oversized);
            } else {
                out.push(Line::Frame(line));
            }
        }
        if self.pending.len() > self.limit {
            self.pending.clear();
            if !self.discarding {
                self.discarding = true;
                out.push(Line::Oversized);
            }
        }
    }

    /// Trailing bytes without a newline, if any
    fn finish(self) -> Option<Vec<u8>> {
        (!self.discarding && !self.pending.is_empty()).then_some(self.pending)
    }
}

fn reject_oversized(session: &Session) {
    warn!(session = %session.id(), limit = MAX_BODY_BYTES, "Dropping oversized request line");
    let _ = session.enqueue(Inbound::Reject(parse_error_response(format!(
        "request line exceeds {} bytes",
        MAX_BODY_BYTES
    ))));
}

fn submit_line(session: &Session, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    session.touch();

    let item = match parse_request(line) {
        Ok(request) => Inbound::Request {
            request,
            kind: FrameKind::Response,
        },
        Err(rejection) => Inbound::Reject(rejection),
    };
    // Overflow is logged by enqueue
    let _ = session.enqueue(item);
}

async fn stream_get(State(state): State<StreamingState>, Path(session_id): Path<String>) -> Response {
    let Some(session) = state.sessions.get(&session_id) else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };
    let Some(subscription) = state.sessions.subscribe(&session, None) else {
        return (StatusCode::CONFLICT, "Session already has a subscriber").into_response();
    };
    session.touch();
    info!(session = %session_id, "NDJSON subscriber attached");

    let lines = stream::unfold(subscription, |mut subscription| async move {
        loop {
            match subscription.next().await? {
                Outgoing::Frame(frame) => return Some((encode_line(&frame.response), subscription)),
                Outgoing::Heartbeat => continue,
            }
        }
    });

    (
        [
            (header::CONTENT_TYPE, NDJSON),
            (HeaderName::from_static(SESSION_ID_HEADER), session_id.as_str()),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

fn encode_line(response: &McpResponse) -> Result<Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
