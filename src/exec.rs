//! External Command Execution
//!
//! Every subsystem adapter talks to its tool (`ip`, `lvm`, `mkfs.xfs`,
//! `pcs`, `systemctl`) through the [`CommandRunner`] port. This module
//! provides the invocation/output types and the tokio-backed runner.

use crate::domain::ports::CommandRunner;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use tokio::process::Command;
use tracing::debug;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Captured result of a finished program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Turn a non-zero exit into [`Error::CommandFailed`]
    pub fn check(self, tool: &str, operation: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            let detail = if self.stderr.trim().is_empty() {
                format!("exit code {}", self.exit_code)
            } else {
                self.stderr.clone()
            };
            Err(Error::command_failed(tool, operation, detail))
        }
    }
}

/// Runs programs on the local host via `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("exec: {}", invocation);

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|e| Error::CommandSpawn {
                program: invocation.program.clone(),
                reason: e.to_string(),
            })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            debug!(
                "exec: {} exited with {}: {}",
                invocation.program,
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}
