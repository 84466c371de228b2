//! Service providers for svcmgr
//!
//! Three back-ends share one contract ([`Provider`]): systemd via
//! `systemctl`, SysV init scripts, and docker containers. The
//! [`ServiceRegistry`] holds whichever of them the host supports and
//! resolves services to providers, auto-detecting when no type is given.
//!
//! All host interaction goes through a [`CommandRunner`]; enable the
//! `testing` feature for a scripted runner.

pub mod docker;
pub mod provider;
pub mod registry;
pub mod runner;
pub mod systemd;
pub mod sysv;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use docker::{CreateContainer, DockerManager, DEFAULT_LOG_LINES};
pub use provider::Provider;
pub use registry::{OperationOutcome, ServiceRegistry};
pub use runner::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use systemd::SystemdManager;
pub use sysv::SysVManager;
