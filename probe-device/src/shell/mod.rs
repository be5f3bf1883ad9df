//! Remote shell abstraction.
//!
//! A [`RemoteShell`] executes one command line on a device and moves files
//! to and from it. It applies no rewriting of its own; the command
//! preparation pipeline runs in [`RemoteSession`](crate::RemoteSession).
//!
//! - [`SshShell`] shells out to `ssh`/`scp` (and `sshpass` for passwords)
//! - [`MockShell`] returns scripted responses and records every command
//! - [`FakeDockerHost`] simulates a device running containers, for manager tests

mod fake_docker;
mod mock;
mod ssh;

pub use fake_docker::{FakeContainer, FakeDockerHost};
pub use mock::MockShell;
pub use ssh::{SshShell, SshShellFactory};

use async_trait::async_trait;
use probe_types::{ErrorKind, RemoteHost};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from the remote shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Local process could not be spawned.
    #[error("spawn error: {0}")]
    Spawn(#[from] std::io::Error),

    /// The host could not be reached or refused authentication.
    #[error("connection to {host} failed: {reason}")]
    ConnectionFailed {
        /// Target host.
        host: String,
        /// Why.
        reason: String,
    },

    /// The command did not finish in time.
    #[error("timed out after {}s: {command}", .timeout.as_secs())]
    Timeout {
        /// Command that timed out.
        command: String,
        /// Timeout applied.
        timeout: Duration,
    },

    /// File transfer failed.
    #[error("transfer failed: {0}")]
    TransferFailed(String),
}

impl ShellError {
    /// Failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::Spawn(_) => ErrorKind::Io,
            ShellError::ConnectionFailed { .. } | ShellError::Timeout { .. } => {
                ErrorKind::Connection
            }
            ShellError::TransferFailed(_) => ErrorKind::Command,
        }
    }
}

/// Output of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success, -1 if killed by a signal).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command and file channel to one host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Check that the host is reachable and accepts our credentials.
    async fn open(&self) -> Result<(), ShellError>;

    /// Execute a command line.
    ///
    /// A non-zero exit is not an error; only failing to run the command is.
    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ShellError>;

    /// Copy a local file to the host.
    async fn upload(&self, local: &Path, remote: &str, timeout: Duration)
        -> Result<(), ShellError>;

    /// Copy a file from the host.
    async fn download(
        &self,
        remote: &str,
        local: &Path,
        timeout: Duration,
    ) -> Result<(), ShellError>;

    /// Release resources. Best effort.
    async fn close(&self) {}
}

/// Creates shells for hosts.
///
/// The orchestrator opens one session per scenario through this seam, so
/// tests can substitute in-memory devices.
pub trait ShellFactory: Send + Sync {
    /// A shell for `host`.
    fn shell_for(&self, host: &RemoteHost) -> Arc<dyn RemoteShell>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_helpers() {
        assert!(CommandOutput::ok("x").success());
        let failed = CommandOutput::failed(127, "not found");
        assert!(!failed.success());
        assert_eq!(failed.stderr, "not found");
    }

    #[test]
    fn error_kinds() {
        let timeout = ShellError::Timeout {
            command: "uptime".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(timeout.kind(), ErrorKind::Connection);
        assert_eq!(timeout.to_string(), "timed out after 30s: uptime");
        assert_eq!(
            ShellError::TransferFailed("x".into()).kind(),
            ErrorKind::Command
        );
    }
}
