//! Service model shared across svcmgr

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Back-end that owns a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// systemd units
    Systemd,
    /// Scripts under the init directory
    Sysv,
    /// Containers managed by the docker CLI
    Docker,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [ServiceType::Systemd, ServiceType::Sysv, ServiceType::Docker];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Systemd => "systemd",
            ServiceType::Sysv => "sysv",
            ServiceType::Docker => "docker",
        }
    }

    /// Heading used when grouping listings ("Systemd", "Sysv", "Docker")
    pub fn title(&self) -> &'static str {
        match self {
            ServiceType::Systemd => "Systemd",
            ServiceType::Sysv => "Sysv",
            ServiceType::Docker => "Docker",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "systemd" => Ok(ServiceType::Systemd),
            "sysv" => Ok(ServiceType::Sysv),
            "docker" => Ok(ServiceType::Docker),
            _ => Err(Error::UnsupportedType(s.to_string())),
        }
    }
}

/// Observed run state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
    Failed,
    #[default]
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Inactive => "inactive",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Unknown => "unknown",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ServiceStatus::Active)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one service as reported by its provider.
///
/// Zero values mean "absent" and are omitted from JSON: an empty
/// description, a pid of 0, a zero uptime and a missing `last_changed`.
/// `uptime` travels as integer nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "is_zero_pid")]
    pub pid: u32,
    #[serde(default, with = "duration_nanos", skip_serializing_if = "Duration::is_zero")]
    pub uptime: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, service_type: ServiceType, status: ServiceStatus) -> Self {
        Self {
            name: name.into(),
            service_type,
            status,
            description: String::new(),
            pid: 0,
            uptime: Duration::ZERO,
            last_changed: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Record when the service entered its current state. Uptime is only
    /// derived for active services; future timestamps clamp to zero.
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_changed = Some(at);
        if self.status.is_active() {
            self.uptime = (Utc::now() - at).to_std().unwrap_or(Duration::ZERO);
        }
        self
    }
}

fn is_zero_pid(pid: &u32) -> bool {
    *pid == 0
}

mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

/// Lifecycle verb applied to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Start,
        Action::Stop,
        Action::Restart,
        Action::Enable,
        Action::Disable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Enable => "enable",
            Action::Disable => "disable",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Action::Start => "started",
            Action::Stop => "stopped",
            Action::Restart => "restarted",
            Action::Enable => "enabled",
            Action::Disable => "disabled",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            "restart" => Ok(Action::Restart),
            "enable" => Ok(Action::Enable),
            "disable" => Ok(Action::Disable),
            _ => Err(Error::InvalidArgument(format!("unsupported action: {}", s))),
        }
    }
}
