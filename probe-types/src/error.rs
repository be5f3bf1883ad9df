//! Failure taxonomy shared across crates.
//!
//! Each crate keeps its own `thiserror` enum; every one of them can report
//! which [`ErrorKind`] it belongs to so results and summaries can be
//! classified without downcasting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Session could not be established or a command timed out.
    Connection,
    /// Remote command returned non-zero.
    Command,
    /// Container or process absent.
    NotFound,
    /// Profiler binary missing in the container.
    ProfilerUnavailable,
    /// Process survived the forceful kill.
    Escalation,
    /// Malformed or missing response from the management protocol.
    Protocol,
    /// Some profiling steps failed but memory restoration still ran.
    Partial,
    /// Operator cancelled the run.
    Cancelled,
    /// Invalid configuration or scenario description.
    Config,
    /// Local filesystem or serialization failure.
    Io,
}

impl ErrorKind {
    /// Stable lowercase name, as used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Command => "command",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ProfilerUnavailable => "profiler_unavailable",
            ErrorKind::Escalation => "escalation",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Partial => "partial",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
