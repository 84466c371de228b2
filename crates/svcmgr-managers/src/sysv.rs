//! SysV init provider: scripts under the init directory

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use svcmgr_core::{Action, Error, Result, ServiceInfo, ServiceStatus, ServiceType};
use tracing::{debug, warn};

use crate::runner::{run_checked, succeeds, CommandRunner};

lazy_static! {
    static ref PID_PATTERN: Regex = Regex::new(r"(?i)\bpid:?\s*(\d+)").expect("static pid pattern");
}

/// Entries in the init directory that are never services
const NON_SERVICE_FILES: &[&str] = &[
    "README", "skeleton", "rcS", "rc", "functions", "halt", "killall", "single", "reboot",
    "bootmisc", "checkroot", "hostname", "keymap", "localmount", "mtab", "procfs", "urandom",
    "hwclock",
];

#[derive(Clone)]
pub struct SysVManager {
    runner: Arc<dyn CommandRunner>,
    init_dir: PathBuf,
}

impl SysVManager {
    pub fn new(runner: Arc<dyn CommandRunner>, init_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            init_dir: init_dir.into(),
        }
    }

    pub fn init_dir(&self) -> &Path {
        &self.init_dir
    }

    pub async fn is_available(&self) -> bool {
        tokio::fs::metadata(&self.init_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    fn script_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(Error::invalid_argument(format!("invalid service name: {:?}", name)));
        }
        Ok(self.init_dir.join(name))
    }

    /// Resolve the script for `name`, requiring a regular file
    async fn existing_script(&self, name: &str) -> Result<PathBuf> {
        let path = self.script_path(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if !meta.is_dir() => Ok(path),
            _ => Err(Error::not_found(name, ServiceType::Sysv.as_str())),
        }
    }

    pub async fn perform(&self, name: &str, action: Action) -> Result<()> {
        let script = self.existing_script(name).await?;
        let script = script.to_string_lossy();

        match action {
            Action::Start | Action::Stop | Action::Restart => {
                run_checked(self.runner.as_ref(), &script, &[action.as_str()]).await?;
            }
            Action::Enable | Action::Disable => self.set_boot_registration(name, action).await?,
        }
        Ok(())
    }

    async fn set_boot_registration(&self, name: &str, action: Action) -> Result<()> {
        let enable = action == Action::Enable;
        let runner = self.runner.as_ref();

        if succeeds(runner, "which", &["chkconfig"]).await {
            run_checked(runner, "chkconfig", &[name, if enable { "on" } else { "off" }]).await?;
            return Ok(());
        }
        if succeeds(runner, "which", &["update-rc.d"]).await {
            run_checked(runner, "update-rc.d", &[name, action.as_str()]).await?;
            return Ok(());
        }
        Err(Error::NoEnableMechanism {
            action: action.as_str().to_string(),
            name: name.to_string(),
        })
    }

    pub async fn status(&self, name: &str) -> Result<ServiceInfo> {
        let script = self.existing_script(name).await?;
        let output = self
            .runner
            .run(&script.to_string_lossy(), &["status"])
            .await?;

        let status = if output.success {
            classify_status(&output.stdout)
        } else {
            ServiceStatus::Inactive
        };

        let mut info = ServiceInfo::new(name, ServiceType::Sysv, status);
        if status.is_active() {
            if let Some(pid) = extract_pid(&output.stdout) {
                info.pid = pid;
                info.uptime = self.process_uptime(pid).await.unwrap_or_default();
            }
        }
        if let Ok(content) = tokio::fs::read_to_string(&script).await {
            info.description = lsb_description(&content).unwrap_or_default();
        }
        Ok(info)
    }

    async fn process_uptime(&self, pid: u32) -> Option<Duration> {
        let pid = pid.to_string();
        let output = self.runner.run("ps", &["-o", "etime=", "-p", &pid]).await.ok()?;
        if !output.success {
            return None;
        }
        parse_etime(output.stdout.trim())
    }

    pub async fn list(&self) -> Result<Vec<ServiceInfo>> {
        let mut entries = tokio::fs::read_dir(&self.init_dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(true);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_dir || name.starts_with('.') || NON_SERVICE_FILES.contains(&name.as_str()) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut services = Vec::with_capacity(names.len());
        for name in names {
            match self.status(&name).await {
                Ok(info) => services.push(info),
                Err(e) => warn!(service = %name, error = %e, "Skipping init script"),
            }
        }
        debug!(count = services.len(), "Listed init scripts");
        Ok(services)
    }
}

fn classify_status(output: &str) -> ServiceStatus {
    let lower = output.to_lowercase();
    if lower.contains("not running") {
        ServiceStatus::Inactive
    } else if lower.contains("running") || lower.contains("started") {
        ServiceStatus::Active
    } else if lower.contains("stopped") || lower.contains("inactive") {
        ServiceStatus::Inactive
    } else if lower.contains("failed") {
        ServiceStatus::Failed
    } else {
        ServiceStatus::Unknown
    }
}

/// First PID mentioned as `PID: n`, `pid n`, `(pid n)` or `(pidn)`
fn extract_pid(output: &str) -> Option<u32> {
    PID_PATTERN
        .captures_iter(output)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .find(|pid| *pid > 0)
}

/// Parse `ps -o etime=` output: `MM:SS`, `HH:MM:SS` or `DD-HH:MM:SS`
fn parse_etime(etime: &str) -> Option<Duration> {
    let (days, clock) = match etime.split_once('-') {
        Some((days, clock)) => (days.parse::<u64>().ok()?, clock),
        None => (0, etime),
    };
    let parts = clock
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let secs = match parts.as_slice() {
        [m, s] => m * 60 + s,
        [h, m, s] => h * 3600 + m * 60 + s,
        _ => return None,
    };
    Some(Duration::from_secs(days * 86_400 + secs))
}

fn lsb_description(script: &str) -> Option<String> {
    script.lines().find_map(|line| {
        line.strip_prefix("# Short-Description:")
            .or_else(|| line.strip_prefix("# Description:"))
            .map(|d| d.trim().to_string())
    })
}
