//! Runner errors.

use crate::config::ConfigError;
use probe_device::DeviceError;
use probe_netconf::NetconfError;
use probe_types::ErrorKind;
use thiserror::Error;

/// Errors from profiling sessions and the orchestrator.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Device or container operation failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Load generator failed.
    #[error(transparent)]
    Netconf(#[from] NetconfError),

    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A setup hook failed.
    #[error("setup failed: {0}")]
    Setup(String),

    /// Writing an artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing an artifact failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operator cancelled the run.
    #[error("cancelled")]
    Cancelled,

    /// A scenario task panicked.
    #[error("scenario panicked: {0}")]
    Panicked(String),

    /// Filters matched nothing.
    #[error("no such {what}: {name}")]
    NotFound {
        /// `device` or `scenario`.
        what: &'static str,
        /// Name given.
        name: String,
    },
}

impl RunnerError {
    /// Failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunnerError::Device(e) => e.kind(),
            RunnerError::Netconf(e) => e.kind(),
            RunnerError::Config(e) => e.kind(),
            RunnerError::Setup(_) => ErrorKind::Command,
            RunnerError::Io(_) | RunnerError::Serialization(_) => ErrorKind::Io,
            RunnerError::Cancelled => ErrorKind::Cancelled,
            RunnerError::Panicked(_) => ErrorKind::Command,
            RunnerError::NotFound { .. } => ErrorKind::Config,
        }
    }
}
