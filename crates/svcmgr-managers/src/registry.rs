//! Provider registry and the typed service operations built on it
//!
//! The registry is populated once at startup and is read-only afterwards,
//! so it is shared behind an `Arc` without locking.

use futures::future::join_all;
use std::sync::Arc;
use svcmgr_core::{Action, Error, ProviderConfig, Result, ServiceInfo, ServiceStatus, ServiceType};
use tracing::{debug, info, warn};

use crate::docker::DockerManager;
use crate::provider::Provider;
use crate::runner::CommandRunner;
use crate::systemd::SystemdManager;
use crate::sysv::SysVManager;

/// Result of a lifecycle operation followed by a status read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub action: Action,
    pub message: String,
    pub service: ServiceInfo,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    providers: Vec<Provider>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider. A provider of the same type is replaced in place.
    pub fn register(&mut self, provider: Provider) {
        let service_type = provider.service_type();
        match self.providers.iter_mut().find(|p| p.service_type() == service_type) {
            Some(existing) => *existing = provider,
            None => self.providers.push(provider),
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.register(provider);
        self
    }

    /// Probe the host and register every available back-end in the order
    /// systemd, sysv, docker.
    pub async fn detect(runner: Arc<dyn CommandRunner>, config: &ProviderConfig) -> Self {
        let candidates = [
            Provider::Systemd(SystemdManager::new(runner.clone())),
            Provider::SysV(SysVManager::new(runner.clone(), config.init_dir.clone())),
            Provider::Docker(DockerManager::new(runner)),
        ];

        let mut registry = Self::new();
        for candidate in candidates {
            let service_type = candidate.service_type();
            if candidate.is_available().await {
                info!(manager = %service_type, "Service manager available");
                registry.register(candidate);
            } else {
                debug!(manager = %service_type, "Service manager not available");
            }
        }
        if registry.is_empty() {
            warn!("No service managers detected on this host");
        }
        registry
    }

    pub fn managers(&self) -> Vec<ServiceType> {
        self.providers.iter().map(Provider::service_type).collect()
    }

    pub fn get(&self, service_type: ServiceType) -> Option<&Provider> {
        self.providers.iter().find(|p| p.service_type() == service_type)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    fn require(&self, service_type: ServiceType) -> Result<&Provider> {
        self.get(service_type)
            .ok_or_else(|| Error::UnsupportedType(service_type.to_string()))
    }

    /// Pick the provider for `name`. An explicit type must be registered;
    /// otherwise the first provider (in registration order) whose status
    /// lookup succeeds wins.
    pub async fn resolve(&self, name: &str, service_type: Option<ServiceType>) -> Result<&Provider> {
        self.locate(name, service_type).await.map(|(provider, _)| provider)
    }

    /// Like [`resolve`](Self::resolve) but hands back the status it read
    /// when auto-detection already read it.
    async fn locate(
        &self,
        name: &str,
        service_type: Option<ServiceType>,
    ) -> Result<(&Provider, Option<ServiceInfo>)> {
        if let Some(service_type) = service_type {
            return Ok((self.require(service_type)?, None));
        }

        let lookups = join_all(self.providers.iter().map(|p| p.status(name))).await;
        for (provider, lookup) in self.providers.iter().zip(lookups) {
            match lookup {
                Ok(info) => {
                    debug!(service = %name, manager = %provider.service_type(), "Auto-detected service manager");
                    return Ok((provider, Some(info)));
                }
                Err(e) => {
                    debug!(service = %name, manager = %provider.service_type(), error = %e, "Probe failed")
                }
            }
        }
        Err(Error::NotFoundInAnyManager(name.to_string()))
    }

    /// List services of one type, or of every registered type. Unfiltered
    /// listing skips providers whose listing fails.
    pub async fn list(&self, service_type: Option<ServiceType>) -> Result<Vec<ServiceInfo>> {
        if let Some(service_type) = service_type {
            return self.require(service_type)?.list().await;
        }

        let mut services = Vec::new();
        for provider in &self.providers {
            match provider.list().await {
                Ok(mut found) => services.append(&mut found),
                Err(e) => warn!(manager = %provider.service_type(), error = %e, "Failed to list services"),
            }
        }
        Ok(services)
    }

    pub async fn status(&self, name: &str, service_type: Option<ServiceType>) -> Result<ServiceInfo> {
        match self.locate(name, service_type).await? {
            (_, Some(info)) => Ok(info),
            (provider, None) => provider.status(name).await,
        }
    }

    /// Run `action` then re-read the service status. A failed status read
    /// after a successful operation is reported as status `unknown`.
    pub async fn perform(
        &self,
        name: &str,
        service_type: Option<ServiceType>,
        action: Action,
    ) -> Result<OperationOutcome> {
        let provider = self.resolve(name, service_type).await?;
        provider.perform(name, action).await?;
        info!(service = %name, manager = %provider.service_type(), action = %action, "Service operation completed");

        let service = match provider.status(name).await {
            Ok(info) => info,
            Err(e) => {
                warn!(service = %name, error = %e, "Status read after operation failed");
                ServiceInfo::new(name, provider.service_type(), ServiceStatus::Unknown)
            }
        };
        Ok(OperationOutcome {
            action,
            message: format!("Service {} {} successfully", name, action.past_tense()),
            service,
        })
    }

    /// The docker provider, for container-only operations
    pub fn container(&self) -> Result<&DockerManager> {
        self.get(ServiceType::Docker)
            .and_then(Provider::as_docker)
            .ok_or(Error::ContainerRuntimeUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    const INSPECT_WEB: &str =
        r#"[{"State":{"Running":true,"Pid":77,"StartedAt":"2024-01-15T10:30:00Z"},"Config":{"Image":"nginx"}}]"#;

    fn systemd_unknown_web() -> ScriptedRunner {
        ScriptedRunner::new()
            .ok("systemctl is-active web", "inactive\n")
            .ok(
                "systemctl show web --property=LoadState,MainPID,Description,ActiveEnterTimestamp",
                "LoadState=not-found\n",
            )
    }

    #[tokio::test]
    async fn test_explicit_type_must_be_registered() {
        let runner = ScriptedRunner::new().into_arc();
        let registry = ServiceRegistry::new().with_provider(Provider::Docker(DockerManager::new(runner)));

        let err = registry.resolve("web", Some(ServiceType::Systemd)).await.unwrap_err();
        assert_eq!(err.to_string(), "unsupported service type: systemd");

        let provider = registry.resolve("web", Some(ServiceType::Docker)).await.unwrap();
        assert_eq!(provider.service_type(), ServiceType::Docker);
    }

    #[tokio::test]
    async fn test_auto_detect_takes_first_successful_lookup() {
        let runner = systemd_unknown_web().ok("docker inspect web", INSPECT_WEB).into_arc();
        let registry = ServiceRegistry::new()
            .with_provider(Provider::Systemd(SystemdManager::new(runner.clone())))
            .with_provider(Provider::Docker(DockerManager::new(runner.clone())));

        let info = registry.status("web", None).await.unwrap();
        assert_eq!(info.service_type, ServiceType::Docker);
        assert_eq!(info.pid, 77);
        assert!(runner.was_called("systemctl is-active web"));
    }

    #[tokio::test]
    async fn test_auto_detect_not_found_anywhere() {
        let runner = systemd_unknown_web().into_arc();
        let registry = ServiceRegistry::new()
            .with_provider(Provider::Systemd(SystemdManager::new(runner.clone())))
            .with_provider(Provider::Docker(DockerManager::new(runner)));

        let err = registry.resolve("web", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFoundInAnyManager(ref n) if n == "web"));
    }

    #[tokio::test]
    async fn test_perform_rereads_status() {
        let runner = ScriptedRunner::new()
            .ok("docker start web", "web\n")
            .ok("docker inspect web", INSPECT_WEB)
            .into_arc();
        let registry = ServiceRegistry::new().with_provider(Provider::Docker(DockerManager::new(runner)));

        let outcome = registry
            .perform("web", Some(ServiceType::Docker), Action::Start)
            .await
            .unwrap();
        assert_eq!(outcome.message, "Service web started successfully");
        assert_eq!(outcome.service.status, ServiceStatus::Active);
    }

    #[tokio::test]
    async fn test_unfiltered_list_skips_failing_provider() {
        let runner = ScriptedRunner::new()
            .fail("systemctl list-units --type=service --no-pager --plain", "no bus")
            .ok("docker ps -a --format json", "{\"ID\":\"abc\",\"Names\":\"web\",\"Image\":\"nginx\",\"State\":\"running\"}\n")
            .into_arc();
        let registry = ServiceRegistry::new()
            .with_provider(Provider::Systemd(SystemdManager::new(runner.clone())))
            .with_provider(Provider::Docker(DockerManager::new(runner)));

        let services = registry.list(None).await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "web");

        assert!(registry.list(Some(ServiceType::Systemd)).await.is_err());
    }

    #[tokio::test]
    async fn test_container_requires_docker() {
        let runner = ScriptedRunner::new().into_arc();
        let registry = ServiceRegistry::new().with_provider(Provider::Systemd(SystemdManager::new(runner)));
        assert!(matches!(registry.container(), Err(Error::ContainerRuntimeUnavailable)));
    }

    #[tokio::test]
    async fn test_register_replaces_same_type() {
        let runner = ScriptedRunner::new().into_arc();
        let registry = ServiceRegistry::new()
            .with_provider(Provider::Docker(DockerManager::new(runner.clone())))
            .with_provider(Provider::Systemd(SystemdManager::new(runner.clone())))
            .with_provider(Provider::Docker(DockerManager::new(runner)));
        assert_eq!(registry.managers(), [ServiceType::Docker, ServiceType::Systemd]);
    }
}
