//! Docker provider driven through the `docker` CLI
//!
//! Containers are treated as services: enable and disable toggle the
//! restart policy. The extra container operations (logs, stats, remove,
//! create) are only reachable through this provider.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use svcmgr_core::{Action, Error, Result, ServiceInfo, ServiceStatus, ServiceType};
use tracing::{debug, warn};

use crate::runner::{run_checked, succeeds, CommandRunner};

const DOCKER: &str = "docker";

/// Default number of log lines returned by [`DockerManager::logs`]
pub const DEFAULT_LOG_LINES: u32 = 100;

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "State")]
    state: Option<InspectState>,
    #[serde(rename = "Config")]
    config: Option<InspectConfig>,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "Pid", default)]
    pid: i64,
    #[serde(rename = "StartedAt", default)]
    started_at: String,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image", default)]
    image: String,
}

/// One line of `docker ps --format json`
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "ID", alias = "Id", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: Names,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Created", default)]
    created: Option<i64>,
}

/// The CLI prints a comma-joined string; the API returns an array
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Names {
    List(Vec<String>),
    Joined(String),
    #[default]
    Missing,
}

impl Names {
    fn first(&self) -> Option<String> {
        let first = match self {
            Names::List(names) => names.first().map(String::as_str),
            Names::Joined(joined) => joined.split(',').next(),
            Names::Missing => None,
        }?;
        let name = first.trim().trim_start_matches('/');
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Options for `docker run -d`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateContainer {
    pub image: String,
    pub name: Option<String>,
    pub options: Vec<String>,
}

#[derive(Clone)]
pub struct DockerManager {
    runner: Arc<dyn CommandRunner>,
}

impl DockerManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn is_available(&self) -> bool {
        succeeds(self.runner.as_ref(), DOCKER, &["--version"]).await
    }

    pub async fn perform(&self, name: &str, action: Action) -> Result<()> {
        let args: Vec<&str> = match action {
            Action::Start | Action::Stop | Action::Restart => vec![action.as_str(), name],
            Action::Enable => vec!["update", "--restart=always", name],
            Action::Disable => vec!["update", "--restart=no", name],
        };
        run_checked(self.runner.as_ref(), DOCKER, &args).await?;
        Ok(())
    }

    pub async fn status(&self, name: &str) -> Result<ServiceInfo> {
        let output = self.runner.run(DOCKER, &["inspect", name]).await?;
        if !output.success {
            debug!(container = %name, stderr = %output.stderr.trim(), "docker inspect failed");
            return Err(Error::not_found(name, ServiceType::Docker.as_str()));
        }

        let entries: Vec<InspectEntry> = serde_json::from_str(&output.stdout)
            .map_err(|e| Error::parse(format!("docker inspect {}: {}", name, e)))?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(name, ServiceType::Docker.as_str()))?;

        let mut info = ServiceInfo::new(name, ServiceType::Docker, ServiceStatus::Unknown);
        if let Some(state) = entry.state {
            info.status = if state.running {
                ServiceStatus::Active
            } else {
                ServiceStatus::Inactive
            };
            info.pid = u32::try_from(state.pid).unwrap_or(0);
            if let Some(at) = parse_started_at(&state.started_at) {
                info = info.started_at(at);
            }
        }
        if let Some(config) = entry.config {
            info.description = format!("Docker container from image: {}", config.image);
        }
        Ok(info)
    }

    pub async fn list(&self) -> Result<Vec<ServiceInfo>> {
        let output = run_checked(self.runner.as_ref(), DOCKER, &["ps", "-a", "--format", "json"]).await?;
        Ok(parse_ps_output(&output.stdout))
    }

    /// Tail of the container log, stdout and stderr combined
    pub async fn logs(&self, name: &str, lines: u32) -> Result<String> {
        let tail = lines.to_string();
        let output = run_checked(self.runner.as_ref(), DOCKER, &["logs", "--tail", &tail, name]).await?;
        Ok(output.combined())
    }

    /// One-shot resource usage sample
    pub async fn stats(&self, name: &str) -> Result<Value> {
        let output = run_checked(
            self.runner.as_ref(),
            DOCKER,
            &["stats", name, "--no-stream", "--format", "json"],
        )
        .await?;
        let stats: Value = serde_json::from_str(output.stdout.trim())
            .map_err(|e| Error::parse(format!("docker stats {}: {}", name, e)))?;
        Ok(stats)
    }

    pub async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(name);
        run_checked(self.runner.as_ref(), DOCKER, &args).await?;
        Ok(())
    }

    /// Start a detached container; returns the id printed by docker
    pub async fn create(&self, spec: &CreateContainer) -> Result<String> {
        if spec.image.trim().is_empty() {
            return Err(Error::invalid_argument("image_name is required"));
        }
        let mut args: Vec<&str> = vec!["run", "-d"];
        if let Some(name) = spec.name.as_deref().filter(|n| !n.is_empty()) {
            args.extend(["--name", name]);
        }
        args.extend(spec.options.iter().map(String::as_str));
        args.push(&spec.image);

        let output = run_checked(self.runner.as_ref(), DOCKER, &args).await?;
        Ok(output.stdout.trim().to_string())
    }
}

/// Docker reports `0001-01-01T00:00:00Z` for containers that never ran
fn parse_started_at(value: &str) -> Option<DateTime<Utc>> {
    let at = DateTime::parse_from_rfc3339(value.trim()).ok()?.with_timezone(&Utc);
    (at.year() > 1).then_some(at)
}

fn parse_ps_output(output: &str) -> Vec<ServiceInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<PsEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unparseable docker ps line");
                None
            }
        })
        .map(|entry| {
            let name = entry
                .names
                .first()
                .unwrap_or_else(|| entry.id.chars().take(12).collect());
            let status = match entry.state.as_str() {
                "running" => ServiceStatus::Active,
                "exited" | "created" => ServiceStatus::Inactive,
                "dead" | "restarting" => ServiceStatus::Failed,
                _ => ServiceStatus::Unknown,
            };
            let mut info = ServiceInfo::new(name, ServiceType::Docker, status)
                .with_description(format!("Docker container from image: {}", entry.image));
            if let Some(created) = entry.created.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
                info = info.started_at(created);
            }
            info
        })
        .collect()
}
