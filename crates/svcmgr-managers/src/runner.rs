//! External command execution
//!
//! Every provider reaches the host through [`CommandRunner`], which keeps
//! process spawning in one place and lets tests substitute canned output.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use svcmgr_core::{Error, Result};
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of one command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`. A non-zero exit is reported through
    /// [`CommandOutput::success`], not as an error; errors mean the command
    /// could not be run at all.
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Spawns real processes with `tokio::process`
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(program = %program, args = ?args, "Executing command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // The child is not killed on timeout; it finishes in the background.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(program = %program, args = ?args, "Command timed out");
                return Err(Error::command_failed(
                    command_line(program, args),
                    format!("timed out after {:?}", self.timeout),
                ));
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub(crate) fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command and turn a non-zero exit into [`Error::CommandFailed`]
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput> {
    let output = runner.run(program, args).await?;
    if output.success {
        Ok(output)
    } else {
        Err(Error::command_failed(command_line(program, args), output.combined()))
    }
}

/// True when the command runs and exits zero
pub(crate) async fn succeeds(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> bool {
    matches!(runner.run(program, args).await, Ok(output) if output.success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let output = CommandOutput {
            success: false,
            stdout: "partial\n".into(),
            stderr: "Unit foo.service not found.\n".into(),
        };
        assert_eq!(output.combined(), "partial\nUnit foo.service not found.");
        assert_eq!(CommandOutput::failed("boom").combined(), "boom");
    }

    #[test]
    fn test_command_line() {
        assert_eq!(command_line("systemctl", &["start", "nginx"]), "systemctl start nginx");
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemCommandRunner::default();
        let output = runner.run("sh", &["-c", "echo out; echo err >&2; exit 3"]).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemCommandRunner::default();
        let err = runner.run("svcmgr-no-such-binary", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_system_runner_timeout() {
        let runner = SystemCommandRunner::new(Duration::from_millis(50));
        let err = runner.run("sleep", &["2"]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
