//! Scripted command runner for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use svcmgr_core::Result;

use crate::runner::{command_line, CommandOutput, CommandRunner};

/// Replays canned output keyed by the full command line
/// (`"systemctl is-active nginx"`). Commands without a script exit non-zero.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, command: &str, output: CommandOutput) -> Self {
        self.script(command, output);
        self
    }

    /// Script a successful command with the given stdout
    pub fn ok(self, command: &str, stdout: &str) -> Self {
        self.on(command, CommandOutput::ok(stdout))
    }

    /// Script a command that exits non-zero with the given stderr
    pub fn fail(self, command: &str, stderr: &str) -> Self {
        self.on(command, CommandOutput::failed(stderr))
    }

    pub fn script(&self, command: &str, output: CommandOutput) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(command.to_string(), output);
        }
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Command lines seen so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.calls().iter().any(|c| c == command)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = command_line(program, args);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }
        let scripted = self
            .scripts
            .lock()
            .ok()
            .and_then(|scripts| scripts.get(&line).cloned());
        Ok(scripted.unwrap_or_else(|| CommandOutput::failed(format!("{}: not scripted", line))))
    }
}
