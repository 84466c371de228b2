//! Capability catalog: the eight tools and two prompts this server exposes

use lazy_static::lazy_static;
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use svcmgr_core::{Action, ServiceType};

/// Tool descriptor as returned by `tools/list`
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolInfo {
    /// Names listed under the schema's `required` array
    pub fn required_args(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// Prompt descriptor as returned by `prompts/list`
#[derive(Debug, Clone, Serialize)]
pub struct PromptInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

/// A catalog tool, resolved from its wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    ListServices,
    GetServiceStatus,
    Operation(Action),
    GetDockerLogs,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::ListServices => "list_services",
            Tool::GetServiceStatus => "get_service_status",
            Tool::Operation(Action::Start) => "start_service",
            Tool::Operation(Action::Stop) => "stop_service",
            Tool::Operation(Action::Restart) => "restart_service",
            Tool::Operation(Action::Enable) => "enable_service",
            Tool::Operation(Action::Disable) => "disable_service",
            Tool::GetDockerLogs => "get_docker_logs",
        }
    }

    pub fn info(&self) -> Option<&'static ToolInfo> {
        TOOLS.iter().find(|t| t.name == self.name())
    }
}

impl FromStr for Tool {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list_services" => Ok(Tool::ListServices),
            "get_service_status" => Ok(Tool::GetServiceStatus),
            "start_service" => Ok(Tool::Operation(Action::Start)),
            "stop_service" => Ok(Tool::Operation(Action::Stop)),
            "restart_service" => Ok(Tool::Operation(Action::Restart)),
            "enable_service" => Ok(Tool::Operation(Action::Enable)),
            "disable_service" => Ok(Tool::Operation(Action::Disable)),
            "get_docker_logs" => Ok(Tool::GetDockerLogs),
            _ => Err(()),
        }
    }
}

/// Prompt names
pub const HELP_PROMPT: &str = "service_management_help";
pub const TROUBLESHOOTING_PROMPT: &str = "service_troubleshooting";

const SERVICE_TYPE_DESCRIPTION: &str = "Type of service (systemd, sysv, docker)";

fn service_type_property(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "enum": ServiceType::ALL.map(|t| t.as_str())
    })
}

fn operation_tool(action: Action, description: &'static str) -> ToolInfo {
    ToolInfo {
        name: Tool::Operation(action).name(),
        description,
        input_schema: json!({
            "type": "object",
            "properties": {
                "service_name": {
                    "type": "string",
                    "description": format!("Name of the service to {}", action)
                },
                "service_type": service_type_property(SERVICE_TYPE_DESCRIPTION)
            },
            "required": ["service_name"]
        }),
    }
}

lazy_static! {
    pub static ref TOOLS: Vec<ToolInfo> = vec![
        ToolInfo {
            name: "list_services",
            description: "List all available services from all service managers",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "service_type": service_type_property("Filter services by type (systemd, sysv, docker)")
                }
            }),
        },
        ToolInfo {
            name: "get_service_status",
            description: "Get detailed status of a specific service",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "service_name": {
                        "type": "string",
                        "description": "Name of the service"
                    },
                    "service_type": service_type_property(SERVICE_TYPE_DESCRIPTION)
                },
                "required": ["service_name"]
            }),
        },
        operation_tool(Action::Start, "Start a service"),
        operation_tool(Action::Stop, "Stop a service"),
        operation_tool(Action::Restart, "Restart a service"),
        operation_tool(Action::Enable, "Enable a service to start at boot"),
        operation_tool(Action::Disable, "Disable a service from starting at boot"),
        ToolInfo {
            name: "get_docker_logs",
            description: "Get logs from a Docker container",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "container_name": {
                        "type": "string",
                        "description": "Name of the Docker container"
                    },
                    "lines": {
                        "type": "integer",
                        "description": "Number of log lines to retrieve (default: 100)",
                        "minimum": 1
                    }
                },
                "required": ["container_name"]
            }),
        },
    ];

    pub static ref PROMPTS: Vec<PromptInfo> = vec![
        PromptInfo {
            name: HELP_PROMPT,
            description: "Get comprehensive help for managing Linux services",
            arguments: vec![PromptArgument {
                name: "topic",
                description: "Specific topic to get help for (systemd, sysv, docker, troubleshooting)",
                required: false,
            }],
        },
        PromptInfo {
            name: TROUBLESHOOTING_PROMPT,
            description: "Get troubleshooting guidance for service issues",
            arguments: vec![
                PromptArgument {
                    name: "service_name",
                    description: "Name of the service having issues",
                    required: true,
                },
                PromptArgument {
                    name: "error_description",
                    description: "Description of the error or issue",
                    required: false,
                },
            ],
        },
    ];
}
