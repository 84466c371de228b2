//! MCP Server
//!
//! Transport-agnostic dispatch: every transport hands parsed envelopes to
//! [`McpServer::handle_request`] and serialises whatever comes back.

use crate::catalog::{Tool, HELP_PROMPT, PROMPTS, TOOLS, TROUBLESHOOTING_PROMPT};
use crate::format;
use crate::prompts;
use crate::protocol::{JsonRpcError, McpRequest, McpResponse};
use crate::{PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use svcmgr_core::{Error, LogHandle, LoggingLevel, ServiceType};
use svcmgr_managers::{ServiceRegistry, DEFAULT_LOG_LINES};
use tracing::{debug, info, warn};

pub struct McpServer {
    registry: Arc<ServiceRegistry>,
    log_handle: Option<LogHandle>,
    log_level: Mutex<Option<LoggingLevel>>,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            log_handle: None,
            log_level: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Let `logging/setLevel` reload the process log filter
    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Level last set through `logging/setLevel`
    pub fn log_level(&self) -> Option<LoggingLevel> {
        *self.log_level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one request. Notifications are processed but produce `None`.
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        let McpRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;
        debug!(method = %method, "Handling MCP request");

        let outcome = match method.as_str() {
            _ if jsonrpc != "2.0" => Err(JsonRpcError::invalid_request(format!(
                "Unsupported jsonrpc version: {}",
                jsonrpc
            ))),
            "" => Err(JsonRpcError::invalid_request("Missing method")),
            "initialize" => Ok(self.handle_initialize(params.as_ref())),
            "initialized" | "notifications/initialized" => {
                self.initialized.store(true, Ordering::Release);
                info!("MCP client initialized");
                Ok(json!({}))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": &*TOOLS })),
            "tools/call" => self.handle_tools_call(params).await,
            "prompts/list" => Ok(json!({ "prompts": &*PROMPTS })),
            "prompts/get" => self.handle_prompts_get(params.as_ref()),
            "logging/setLevel" => self.handle_set_level(params.as_ref()),
            _ => {
                warn!(method = %method, "Unknown method");
                Err(JsonRpcError::method_not_found(&method))
            }
        };

        let id = id?;
        Some(match outcome {
            Ok(result) => McpResponse::success(id, result),
            Err(error) => McpResponse::error(id, error),
        })
    }

    fn handle_initialize(&self, params: Option<&Value>) -> Value {
        if let Some(client) = params.and_then(|p| p.get("clientInfo")) {
            let name = client.get("name").and_then(Value::as_str).unwrap_or("unknown");
            let version = client.get("version").and_then(Value::as_str).unwrap_or("unknown");
            info!(client = %name, version = %version, "MCP client connecting");
        }

        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "logging": {},
                "prompts": { "listChanged": false },
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        })
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tool name"))?;
        let args = match params.get("arguments") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => json!({}),
        };

        info!(tool = %name, "Calling tool");
        let outcome = match name.parse::<Tool>() {
            Ok(tool) => self.run_tool(tool, &args).await,
            Err(()) => Err(format!("Unknown tool: {}", name)),
        };

        Ok(match outcome {
            Ok(text) => tool_result(text, false),
            Err(message) => {
                warn!(tool = %name, error = %message, "Tool call failed");
                tool_result(format!("Error: {}", message), true)
            }
        })
    }

    /// Run a catalog tool. `Err` carries the user-facing failure text.
    async fn run_tool(&self, tool: Tool, args: &Value) -> Result<String, String> {
        if let Some(info) = tool.info() {
            for required in info.required_args() {
                if str_arg(Some(args), required).map_or(true, str::is_empty) {
                    return Err(format!("{} is required", required));
                }
            }
        }

        match tool {
            Tool::ListServices => {
                let service_type = service_type_arg(args)?;
                let services = self.registry.list(service_type).await.map_err(|e| {
                    let context = match service_type {
                        Some(t) => format!("Failed to list {} services", t),
                        None => "Failed to list services".to_string(),
                    };
                    describe(e, &context)
                })?;
                Ok(format::format_services(&services))
            }
            Tool::GetServiceStatus => {
                let name = str_arg(Some(args), "service_name").unwrap_or_default();
                let service_type = service_type_arg(args)?;
                let info = self
                    .registry
                    .status(name, service_type)
                    .await
                    .map_err(|e| describe(e, "Failed to get service status"))?;
                Ok(format::format_service_info(&info))
            }
            Tool::Operation(action) => {
                let name = str_arg(Some(args), "service_name").unwrap_or_default();
                let service_type = service_type_arg(args)?;
                let outcome = self
                    .registry
                    .perform(name, service_type, action)
                    .await
                    .map_err(|e| describe(e, &format!("Failed to {} service", action)))?;
                Ok(format::format_operation(&outcome))
            }
            Tool::GetDockerLogs => {
                let name = str_arg(Some(args), "container_name").unwrap_or_default();
                let lines = lines_arg(args)?;
                let docker = self.registry.container().map_err(|e| e.to_string())?;
                let logs = docker
                    .logs(name, lines)
                    .await
                    .map_err(|e| describe(e, "Failed to get logs"))?;
                Ok(format::format_logs(name, lines, &logs))
            }
        }
    }

    fn handle_prompts_get(&self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("Missing prompt name"))?;
        let args = params.get("arguments");

        let (description, text) = match name {
            HELP_PROMPT => (
                prompts::HELP_DESCRIPTION.to_string(),
                prompts::management_help(str_arg(args, "topic")).to_string(),
            ),
            TROUBLESHOOTING_PROMPT => {
                let service = str_arg(args, "service_name")
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| JsonRpcError::invalid_params("service_name is required"))?;
                (
                    prompts::troubleshooting_description(service),
                    prompts::troubleshooting(service, str_arg(args, "error_description")),
                )
            }
            _ => {
                return Err(JsonRpcError::new(
                    JsonRpcError::METHOD_NOT_FOUND,
                    format!("Unknown prompt: {}", name),
                ))
            }
        };

        Ok(json!({
            "description": description,
            "messages": [{
                "role": "assistant",
                "content": { "type": "text", "text": text }
            }]
        }))
    }

    fn handle_set_level(&self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        let level = params
            .and_then(|p| p.get("level"))
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("Missing level"))?;
        let level: LoggingLevel = level
            .parse()
            .map_err(|e: Error| JsonRpcError::invalid_params(e.to_string()))?;

        if let Some(handle) = &self.log_handle {
            handle
                .set_level(level)
                .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;
        }
        *self.log_level.lock().unwrap_or_else(PoisonError::into_inner) = Some(level);
        info!(level = %level.as_str(), "Log level changed");
        Ok(json!({}))
    }
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

fn str_arg<'a>(args: Option<&'a Value>, key: &str) -> Option<&'a str> {
    args.and_then(|a| a.get(key)).and_then(Value::as_str)
}

/// Absent, null or empty means auto-detect
fn service_type_arg(args: &Value) -> Result<Option<ServiceType>, String> {
    match args.get("service_type") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some).map_err(|e: Error| e.to_string()),
        Some(_) => Err("service_type must be a string".to_string()),
    }
}

fn lines_arg(args: &Value) -> Result<u32, String> {
    match args.get("lines") {
        None | Some(Value::Null) => Ok(DEFAULT_LOG_LINES),
        Some(value) => value
            .as_u64()
            .filter(|n| *n >= 1)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| "lines must be a positive integer".to_string()),
    }
}

/// Resolution failures are already readable; provider failures get context.
fn describe(error: Error, context: &str) -> String {
    match error {
        Error::UnsupportedType(_) | Error::NotFoundInAnyManager(_) | Error::ContainerRuntimeUnavailable => {
            error.to_string()
        }
        other => format!("{}: {}", context, other),
    }
}
