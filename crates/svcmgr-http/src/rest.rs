//! REST API
//!
//! A fixed URL tree over the service registry. Successful responses carry
//! `{"success": true, "message": ..., <payload>}`; failures go through
//! [`ApiError`].

use crate::error::ApiError;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use svcmgr_core::{Action, Config, ServiceType};
use svcmgr_managers::{CreateContainer, ServiceRegistry, DEFAULT_LOG_LINES};
use tracing::{debug, info};

/// Name reported by `/info`
pub const API_NAME: &str = "MCP Service Manager";

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Clone)]
pub struct RestState {
    pub registry: Arc<ServiceRegistry>,
    pub config: Arc<Config>,
}

impl RestState {
    pub fn new(registry: Arc<ServiceRegistry>, config: Arc<Config>) -> Self {
        Self { registry, config }
    }
}

pub fn router(state: RestState) -> Router {
    let mut router = Router::new()
        .route("/services", get(list_services))
        .route("/services/action", post(service_action))
        .route("/services/:name/status", get(service_status));

    for action in Action::ALL {
        router = router.route(
            &format!("/services/:name/{}", action.as_str()),
            post(
                move |state: State<RestState>, name: Path<String>, query: Query<TypeQuery>| {
                    service_operation(state, name, query, action)
                },
            ),
        );
    }

    router
        .route("/docker/create", post(create_container))
        .route("/docker/:name/logs", get(container_logs))
        .route("/docker/:name/stats", get(container_stats))
        .route("/docker/:name/remove", delete(remove_container))
        .route("/health", get(health))
        .route("/info", get(server_info))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct TypeQuery {
    #[serde(rename = "type")]
    service_type: Option<String>,
}

impl TypeQuery {
    fn parse(&self) -> Result<Option<ServiceType>, ApiError> {
        parse_service_type(self.service_type.as_deref())
    }
}

/// Empty or absent means "any registered type"
fn parse_service_type(raw: Option<&str>) -> Result<Option<ServiceType>, ApiError> {
    match raw.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(None),
        Some(t) => t
            .parse()
            .map(Some)
            .map_err(|e| ApiError::from_service(e, "Invalid service type")),
    }
}

async fn list_services(State(state): State<RestState>, Query(query): Query<TypeQuery>) -> ApiResult {
    let service_type = query.parse()?;
    let services = state
        .registry
        .list(service_type)
        .await
        .map_err(|e| ApiError::from_service(e, "Failed to list services"))?;

    debug!(count = services.len(), "Listed services");
    Ok(Json(json!({
        "success": true,
        "message": "Services listed successfully",
        "services": services,
    })))
}

async fn service_status(
    State(state): State<RestState>,
    Path(name): Path<String>,
    Query(query): Query<TypeQuery>,
) -> ApiResult {
    let service_type = query.parse()?;
    let service = state
        .registry
        .status(&name, service_type)
        .await
        .map_err(|e| ApiError::from_service(e, "Failed to get service status"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Service status retrieved successfully",
        "service": service,
    })))
}

async fn service_operation(
    State(state): State<RestState>,
    Path(name): Path<String>,
    Query(query): Query<TypeQuery>,
    action: Action,
) -> ApiResult {
    let service_type = query.parse()?;
    perform(&state, &name, service_type, action).await
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    service_type: Option<String>,
    #[serde(default)]
    action: String,
}

async fn service_action(State(state): State<RestState>, body: Bytes) -> ApiResult {
    let request: ActionRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid request body"))?;
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let action: Action = request
        .action
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Unsupported action: {}", request.action)))?;
    let service_type = parse_service_type(request.service_type.as_deref())?;

    perform(&state, &request.name, service_type, action).await
}

async fn perform(
    state: &RestState,
    name: &str,
    service_type: Option<ServiceType>,
    action: Action,
) -> ApiResult {
    let outcome = state
        .registry
        .perform(name, service_type, action)
        .await
        .map_err(|e| ApiError::from_service(e, &format!("Failed to {} service", action)))?;

    info!(service = %name, action = %action, "REST operation completed");
    Ok(Json(json!({
        "success": true,
        "message": outcome.message,
        "service": outcome.service,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct LogsQuery {
    lines: Option<String>,
}

async fn container_logs(
    State(state): State<RestState>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult {
    let docker = state
        .registry
        .container()
        .map_err(|e| ApiError::from_service(e, "Failed to get logs"))?;
    // Unparseable or non-positive values fall back to the default
    let lines = query
        .lines
        .and_then(|l| l.trim().parse::<u32>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_LOG_LINES);

    let logs = docker
        .logs(&name, lines)
        .await
        .map_err(|e| ApiError::from_service(e, "Failed to get logs"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Logs retrieved successfully",
        "logs": logs,
    })))
}

async fn container_stats(State(state): State<RestState>, Path(name): Path<String>) -> ApiResult {
    let docker = state
        .registry
        .container()
        .map_err(|e| ApiError::from_service(e, "Failed to get stats"))?;
    let stats = docker
        .stats(&name)
        .await
        .map_err(|e| ApiError::from_service(e, "Failed to get stats"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Stats retrieved successfully",
        "stats": stats,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct RemoveQuery {
    force: Option<String>,
}

async fn remove_container(
    State(state): State<RestState>,
    Path(name): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> ApiResult {
    let docker = state
        .registry
        .container()
        .map_err(|e| ApiError::from_service(e, "Failed to remove container"))?;
    let force = query.force.as_deref() == Some("true");

    docker
        .remove(&name, force)
        .await
        .map_err(|e| ApiError::from_service(e, "Failed to remove container"))?;

    info!(container = %name, force, "Container removed");
    Ok(Json(json!({
        "success": true,
        "message": "Container removed successfully",
    })))
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    image_name: String,
    #[serde(default)]
    container_name: Option<String>,
    #[serde(default)]
    options: Vec<String>,
}

async fn create_container(State(state): State<RestState>, body: Bytes) -> ApiResult {
    let docker = state
        .registry
        .container()
        .map_err(|e| ApiError::from_service(e, "Failed to create container"))?;
    let request: CreateRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid request body"))?;

    let spec = CreateContainer {
        image: request.image_name,
        name: request.container_name,
        options: request.options,
    };
    let container_id = docker
        .create(&spec)
        .await
        .map_err(|e| ApiError::from_service(e, "Failed to create container"))?;

    info!(image = %spec.image, container = %container_id, "Container created");
    Ok(Json(json!({
        "success": true,
        "message": "Container created successfully",
        "container_id": container_id,
    })))
}

fn manager_names(registry: &ServiceRegistry) -> Vec<&'static str> {
    registry.managers().iter().map(ServiceType::as_str).collect()
}

async fn health(State(state): State<RestState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "managers": manager_names(&state.registry),
    }))
}

async fn server_info(State(state): State<RestState>) -> Json<Value> {
    Json(json!({
        "name": API_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "managers": manager_names(&state.registry),
        "config": state.config.as_ref(),
    }))
}
