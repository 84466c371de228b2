//! SSE Transport
//!
//! `GET /sse` opens a session and streams `connected`, `endpoint`,
//! `message`/`response` and `heartbeat` events. Requests are POSTed to
//! `/message?session=<id>` (replies arrive as `message` events) or to
//! `/mcp/messages` with the `X-MCP-Client-ID` header (replies arrive as
//! `response` events).

use super::{StreamingState, CLIENT_ID_HEADER};
use crate::protocol::parse_request;
use crate::session::{FrameKind, Inbound, Outgoing, CLIENT_PREFIX};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderName, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

pub fn router(state: StreamingState) -> Router {
    Router::new()
        .route("/sse", get(sse_handler))
        .route("/mcp/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .route("/mcp/messages", post(legacy_messages_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<StreamingState>) -> Json<Value> {
    Json(state.health("sse-http"))
}

async fn sse_handler(State(state): State<StreamingState>) -> Response {
    let sessions = state.sessions.clone();
    let session = sessions.open(CLIENT_PREFIX);
    let id = session.id().to_string();
    let heartbeat = sessions.config().heartbeat();
    let Some(subscription) = sessions.subscribe(&session, Some(heartbeat)) else {
        sessions.remove(&id);
        return (StatusCode::CONFLICT, "Session already has a subscriber").into_response();
    };
    info!(session = %id, "SSE client connected");

    let connected = Event::default().event("connected").data(
        json!({
            "clientId": &id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
        .to_string(),
    );
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}/message?session={}", state.base_url, id));

    let live = stream::unfold(subscription, |mut subscription| async move {
        let event = match subscription.next().await? {
            Outgoing::Frame(frame) => {
                let data = serde_json::to_string(&frame.response).unwrap_or_default();
                Event::default().event(frame.kind.event_name()).data(data)
            }
            Outgoing::Heartbeat => Event::default().event("heartbeat").data(
                json!({ "timestamp": chrono::Utc::now().to_rfc3339() }).to_string(),
            ),
        };
        Some((Ok::<_, Infallible>(event), subscription))
    });
    let events = stream::iter([Ok(connected), Ok(endpoint)]).chain(live);

    (
        [(HeaderName::from_static(CLIENT_ID_HEADER), id)],
        Sse::new(events),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session: Option<String>,
}

async fn message_handler(
    State(state): State<StreamingState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let id = query.session.unwrap_or_default();
    match submit(&state, &id, &body, FrameKind::Message) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(rejection) => rejection,
    }
}

async fn legacy_messages_handler(
    State(state): State<StreamingState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match submit(&state, id, &body, FrameKind::Response) {
        Ok(message_id) => Json(json!({
            "success": true,
            "messageId": message_id,
        }))
        .into_response(),
        Err(rejection) => rejection,
    }
}

/// Queue one POSTed envelope on session `id`. Returns the request id.
fn submit(state: &StreamingState, id: &str, body: &str, kind: FrameKind) -> Result<Value, Response> {
    let session = state
        .sessions
        .get(id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Session not found").into_response())?;
    session.touch();

    let request = parse_request(body).map_err(|_| (StatusCode::BAD_REQUEST, "Invalid JSON").into_response())?;
    let message_id = request.id.clone().unwrap_or(Value::Null);
    debug!(session = %id, method = %request.method, "Queued SSE request");

    match session.enqueue(Inbound::Request { request, kind }) {
        Ok(()) => Ok(message_id),
        Err(TrySendError::Full(_)) => {
            Err((StatusCode::SERVICE_UNAVAILABLE, "Session queue full").into_response())
        }
        Err(TrySendError::Closed(_)) => Err((StatusCode::NOT_FOUND, "Session not found").into_response()),
    }
}
