//! Uniform provider contract over the three back-ends

use svcmgr_core::{Action, Result, ServiceInfo, ServiceType};

use crate::docker::DockerManager;
use crate::systemd::SystemdManager;
use crate::sysv::SysVManager;

/// One service-management back-end. Dispatch is a plain match, so every
/// back-end exposes the same seven operations.
#[derive(Clone)]
pub enum Provider {
    Systemd(SystemdManager),
    SysV(SysVManager),
    Docker(DockerManager),
}

impl Provider {
    pub fn service_type(&self) -> ServiceType {
        match self {
            Provider::Systemd(_) => ServiceType::Systemd,
            Provider::SysV(_) => ServiceType::Sysv,
            Provider::Docker(_) => ServiceType::Docker,
        }
    }

    pub async fn is_available(&self) -> bool {
        match self {
            Provider::Systemd(m) => m.is_available().await,
            Provider::SysV(m) => m.is_available().await,
            Provider::Docker(m) => m.is_available().await,
        }
    }

    pub async fn perform(&self, name: &str, action: Action) -> Result<()> {
        match self {
            Provider::Systemd(m) => m.perform(name, action).await,
            Provider::SysV(m) => m.perform(name, action).await,
            Provider::Docker(m) => m.perform(name, action).await,
        }
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        self.perform(name, Action::Start).await
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        self.perform(name, Action::Stop).await
    }

    pub async fn restart(&self, name: &str) -> Result<()> {
        self.perform(name, Action::Restart).await
    }

    pub async fn enable(&self, name: &str) -> Result<()> {
        self.perform(name, Action::Enable).await
    }

    pub async fn disable(&self, name: &str) -> Result<()> {
        self.perform(name, Action::Disable).await
    }

    pub async fn status(&self, name: &str) -> Result<ServiceInfo> {
        match self {
            Provider::Systemd(m) => m.status(name).await,
            Provider::SysV(m) => m.status(name).await,
            Provider::Docker(m) => m.status(name).await,
        }
    }

    pub async fn list(&self) -> Result<Vec<ServiceInfo>> {
        match self {
            Provider::Systemd(m) => m.list().await,
            Provider::SysV(m) => m.list().await,
            Provider::Docker(m) => m.list().await,
        }
    }

    pub fn as_docker(&self) -> Option<&DockerManager> {
        match self {
            Provider::Docker(m) => Some(m),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Provider({})", self.service_type())
    }
}
