//! Error types for svcmgr

use thiserror::Error;

/// Main error type for service management operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("service {name} not found in {manager}")]
    NotFound { name: String, manager: String },

    #[error("service {0} not found in any manager")]
    NotFoundInAnyManager(String),

    #[error("unsupported service type: {0}")]
    UnsupportedType(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("neither chkconfig nor update-rc.d found; cannot {action} {name}")]
    NoEnableMechanism { action: String, name: String },

    #[error("docker manager not available")]
    ContainerRuntimeUnavailable,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(name: impl Into<String>, manager: impl Into<String>) -> Self {
        Error::NotFound {
            name: name.into(),
            manager: manager.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a command failure carrying the combined process output
    pub fn command_failed(command: impl Into<String>, output: impl Into<String>) -> Self {
        Error::CommandFailed {
            command: command.into(),
            output: output.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for the "this provider does not know that name" family
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::NotFoundInAnyManager(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::not_found("nginx", "sysv").to_string(),
            "service nginx not found in sysv"
        );
        assert_eq!(
            Error::NotFoundInAnyManager("ghost".into()).to_string(),
            "service ghost not found in any manager"
        );
        assert_eq!(
            Error::ContainerRuntimeUnavailable.to_string(),
            "docker manager not available"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::not_found("a", "docker").is_not_found());
        assert!(Error::NotFoundInAnyManager("a".into()).is_not_found());
        assert!(!Error::command_failed("systemctl start a", "boom").is_not_found());
    }
}
