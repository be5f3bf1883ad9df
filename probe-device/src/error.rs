//! Device-layer errors.

use crate::shell::ShellError;
use probe_types::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Errors from the remote session and the container manager.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Session could not be established.
    #[error("connection to {host} failed: {reason}")]
    Connection {
        /// Target host.
        host: String,
        /// Why.
        reason: String,
    },

    /// Operation needs a connected session.
    #[error("not connected")]
    NotConnected,

    /// A command did not finish in time.
    #[error("timed out after {}s: {command}", .timeout.as_secs())]
    Timeout {
        /// Command line.
        command: String,
        /// Timeout applied.
        timeout: Duration,
    },

    /// A remote command exited non-zero.
    #[error("command failed with exit code {exit_code}: {command}: {stderr}")]
    Command {
        /// Command line as sent.
        command: String,
        /// Exit code.
        exit_code: i32,
        /// Trimmed standard error.
        stderr: String,
    },

    /// No container matched.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// No managed process in the container.
    #[error("no managed process found in container {0}")]
    ProcessNotFound(String),

    /// Profiler binary is missing from the container.
    #[error("{binary} is not available in container {container}")]
    ProfilerUnavailable {
        /// Container id.
        container: String,
        /// Missing binary.
        binary: String,
    },

    /// The profiler was launched but never showed up in the process list.
    #[error("profiler did not start in container {0}")]
    ProfilerNotStarted(String),

    /// Processes survived the forceful kill.
    #[error("processes {pids:?} in container {container} survived KILL")]
    Escalation {
        /// Container id.
        container: String,
        /// Surviving pids.
        pids: Vec<u32>,
    },

    /// A change did not take effect.
    #[error("verification failed in {container}: expected {expected}, observed {observed}")]
    Verification {
        /// Container id.
        container: String,
        /// Expected value.
        expected: String,
        /// Observed value.
        observed: String,
    },

    /// Tool output could not be parsed.
    #[error("unexpected output: {0}")]
    Parse(String),

    /// File transfer failed.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::Connection { .. }
            | DeviceError::NotConnected
            | DeviceError::Timeout { .. } => ErrorKind::Connection,
            DeviceError::Command { .. }
            | DeviceError::Verification { .. }
            | DeviceError::Parse(_)
            | DeviceError::Transfer(_) => ErrorKind::Command,
            DeviceError::ContainerNotFound(_) | DeviceError::ProcessNotFound(_) => {
                ErrorKind::NotFound
            }
            DeviceError::ProfilerUnavailable { .. } | DeviceError::ProfilerNotStarted(_) => {
                ErrorKind::ProfilerUnavailable
            }
            DeviceError::Escalation { .. } => ErrorKind::Escalation,
            DeviceError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<ShellError> for DeviceError {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::Spawn(e) => DeviceError::Io(e),
            ShellError::ConnectionFailed { host, reason } => DeviceError::Connection { host, reason },
            ShellError::Timeout { command, timeout } => DeviceError::Timeout { command, timeout },
            ShellError::TransferFailed(msg) => DeviceError::Transfer(msg),
        }
    }
}
