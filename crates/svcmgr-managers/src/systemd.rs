//! systemd provider backed by `systemctl`

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use svcmgr_core::{Action, Error, Result, ServiceInfo, ServiceStatus, ServiceType};
use tracing::debug;

use crate::runner::{run_checked, succeeds, CommandRunner};

const SYSTEMCTL: &str = "systemctl";
const SHOW_PROPERTIES: &str = "--property=LoadState,MainPID,Description,ActiveEnterTimestamp";

#[derive(Clone)]
pub struct SystemdManager {
    runner: Arc<dyn CommandRunner>,
}

impl SystemdManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn is_available(&self) -> bool {
        succeeds(self.runner.as_ref(), SYSTEMCTL, &["--version"]).await
    }

    pub async fn perform(&self, name: &str, action: Action) -> Result<()> {
        run_checked(self.runner.as_ref(), SYSTEMCTL, &[action.as_str(), name]).await?;
        Ok(())
    }

    pub async fn status(&self, name: &str) -> Result<ServiceInfo> {
        // is-active exits non-zero for anything but "active"; the text is
        // still authoritative.
        let active = self.runner.run(SYSTEMCTL, &["is-active", name]).await?;
        let status = parse_active_state(&active.stdout);

        let show = run_checked(self.runner.as_ref(), SYSTEMCTL, &["show", name, SHOW_PROPERTIES]).await?;
        let props = parse_properties(&show.stdout);

        if props.get("LoadState").copied() == Some("not-found") {
            debug!(service = %name, "systemd unit not found");
            return Err(Error::not_found(name, ServiceType::Systemd.as_str()));
        }

        let mut info = ServiceInfo::new(name, ServiceType::Systemd, status);
        if let Some(description) = props.get("Description") {
            info.description = description.to_string();
        }
        if let Some(pid) = props.get("MainPID").and_then(|p| p.parse::<u32>().ok()) {
            info.pid = pid;
        }
        if let Some(at) = props.get("ActiveEnterTimestamp").and_then(|t| parse_timestamp(t)) {
            info = info.started_at(at);
        }
        Ok(info)
    }

    pub async fn list(&self) -> Result<Vec<ServiceInfo>> {
        let output = run_checked(
            self.runner.as_ref(),
            SYSTEMCTL,
            &["list-units", "--type=service", "--no-pager", "--plain"],
        )
        .await?;
        Ok(parse_unit_list(&output.stdout))
    }
}

fn parse_active_state(output: &str) -> ServiceStatus {
    match output.trim() {
        "active" => ServiceStatus::Active,
        "inactive" => ServiceStatus::Inactive,
        "failed" => ServiceStatus::Failed,
        _ => ServiceStatus::Unknown,
    }
}

fn parse_properties(output: &str) -> HashMap<&str, &str> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .collect()
}

/// Parse `Mon 2024-01-15 10:30:00 UTC`. UTC and GMT are honoured; any other
/// zone abbreviation is read as local time.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() || value == "n/a" {
        return None;
    }
    let mut parts = value.split_whitespace();
    let _weekday = parts.next()?;
    let date = parts.next()?;
    let time = parts.next()?;
    let zone = parts.next().unwrap_or("UTC");

    let naive = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S").ok()?;
    match zone {
        "UTC" | "GMT" => Some(Utc.from_utc_datetime(&naive)),
        _ => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc)),
    }
}

fn parse_unit_list(output: &str) -> Vec<ServiceInfo> {
    output
        .lines()
        .filter(|line| line.contains(".service"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let name = fields[0].trim_end_matches(".service");
            let status = match fields[3] {
                "running" => ServiceStatus::Active,
                "dead" | "exited" => ServiceStatus::Inactive,
                "failed" => ServiceStatus::Failed,
                _ => ServiceStatus::Unknown,
            };
            Some(
                ServiceInfo::new(name, ServiceType::Systemd, status)
                    .with_description(fields[4..].join(" ")),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use crate::testing::ScriptedRunner;
    use chrono::Datelike;

    const SHOW_NGINX: &str = "systemctl show nginx --property=LoadState,MainPID,Description,ActiveEnterTimestamp";

    #[test]
    fn test_parse_active_state() {
        assert_eq!(parse_active_state("active\n"), ServiceStatus::Active);
        assert_eq!(parse_active_state("inactive"), ServiceStatus::Inactive);
        assert_eq!(parse_active_state("failed"), ServiceStatus::Failed);
        assert_eq!(parse_active_state("activating"), ServiceStatus::Unknown);
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("Mon 2024-01-15 10:30:00 UTC").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T10:30:00+00:00");
        assert!(parse_timestamp("n/a").is_none());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());

        let local = parse_timestamp("Tue 2024-03-05 08:00:00 CET").unwrap();
        assert_eq!(local.year(), 2024);
    }

    #[test]
    fn test_parse_unit_list() {
        let output = "\
UNIT                 LOAD   ACTIVE   SUB     DESCRIPTION
cron.service         loaded active   running Regular background program processing daemon
nginx.service        loaded failed   failed  A high performance web server
setup.service        loaded active   exited  One-shot setup
weird.service        loaded active   reloading Something

4 loaded units listed.
";
        let services = parse_unit_list(output);
        assert_eq!(services.len(), 4);
        assert_eq!(services[0].name, "cron");
        assert_eq!(services[0].status, ServiceStatus::Active);
        assert_eq!(services[0].description, "Regular background program processing daemon");
        assert_eq!(services[1].status, ServiceStatus::Failed);
        assert_eq!(services[2].status, ServiceStatus::Inactive);
        assert_eq!(services[3].status, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_status_reads_details() {
        let runner = ScriptedRunner::new()
            .ok("systemctl is-active nginx", "active\n")
            .ok(
                SHOW_NGINX,
                "LoadState=loaded\nMainPID=812\nDescription=nginx web server\nActiveEnterTimestamp=Mon 2024-01-15 10:30:00 UTC\n",
            );
        let manager = SystemdManager::new(runner.into_arc());

        let info = manager.status("nginx").await.unwrap();
        assert_eq!(info.status, ServiceStatus::Active);
        assert_eq!(info.pid, 812);
        assert_eq!(info.description, "nginx web server");
        assert!(info.last_changed.is_some());
        assert!(!info.uptime.is_zero());
    }

    #[tokio::test]
    async fn test_status_inactive_despite_exit_code() {
        let runner = ScriptedRunner::new()
            .on(
                "systemctl is-active nginx",
                CommandOutput {
                    success: false,
                    stdout: "inactive\n".into(),
                    stderr: String::new(),
                },
            )
            .ok(SHOW_NGINX, "LoadState=loaded\nMainPID=0\nDescription=nginx\nActiveEnterTimestamp=\n");
        let manager = SystemdManager::new(runner.into_arc());

        let info = manager.status("nginx").await.unwrap();
        assert_eq!(info.status, ServiceStatus::Inactive);
        assert_eq!(info.pid, 0);
        assert!(info.last_changed.is_none());
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let runner = ScriptedRunner::new()
            .on(
                "systemctl is-active ghost",
                CommandOutput {
                    success: false,
                    stdout: "inactive\n".into(),
                    stderr: String::new(),
                },
            )
            .ok(
                "systemctl show ghost --property=LoadState,MainPID,Description,ActiveEnterTimestamp",
                "LoadState=not-found\nMainPID=0\nDescription=ghost.service\n",
            );
        let manager = SystemdManager::new(runner.into_arc());

        let err = manager.status("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_perform_failure_carries_output() {
        let runner = ScriptedRunner::new()
            .fail("systemctl start nginx", "Job for nginx.service failed.");
        let manager = SystemdManager::new(runner.into_arc());

        let err = manager.perform("nginx", Action::Start).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "command `systemctl start nginx` failed: Job for nginx.service failed."
        );
    }
}
