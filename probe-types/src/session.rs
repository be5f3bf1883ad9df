//! Profiling session identity, status and summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{ErrorKind, ProfilerKind};

/// Unique identifier of one profiling attempt.
///
/// `<prefix>_<8 hex chars>`; a fresh suffix is drawn for every attempt so
/// artifacts of a retried scenario never overwrite each other.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// New id with a random suffix.
    pub fn generate(prefix: &str) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        let prefix: String = prefix
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if prefix.is_empty() {
            Self(format!("session_{}", &uuid[..8]))
        } else {
            Self(format!("{}_{}", prefix, &uuid[..8]))
        }
    }

    /// Wrap an existing id.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Status of a profiling session.
///
/// `Initializing → MemoryIncreased → ProcessVerified → ProfilerAttached →
/// Running → Stopping → Collected → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Nothing has been changed on the device yet.
    Initializing,
    /// Container memory limit raised.
    MemoryIncreased,
    /// Target process resolved.
    ProcessVerified,
    /// Application restarted under the profiler.
    ProfilerAttached,
    /// Holding for the configured duration.
    Running,
    /// Profiler signalled to flush.
    Stopping,
    /// Artifact copied to the local machine.
    Collected,
    /// Terminal: artifact collected.
    Completed,
    /// Terminal: something failed before the artifact was collected.
    Failed,
}

impl SessionStatus {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initializing => "INITIALIZING",
            SessionStatus::MemoryIncreased => "MEMORY_INCREASED",
            SessionStatus::ProcessVerified => "PROCESS_VERIFIED",
            SessionStatus::ProfilerAttached => "PROFILER_ATTACHED",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Stopping => "STOPPING",
            SessionStatus::Collected => "COLLECTED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// What happened to the memory limit in the cleanup path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationOutcome {
    /// A restore call was issued.
    pub attempted: bool,
    /// The operator opted out with `restore_memory = false`.
    pub skipped: bool,
    /// The restore call succeeded and was verified.
    pub succeeded: bool,
    /// Limit that was (or would have been) restored.
    pub target_limit: Option<String>,
    /// Why restoration failed.
    pub error: Option<String>,
}

impl RestorationOutcome {
    /// Restoration not needed: the limit was never raised.
    pub fn not_needed() -> Self {
        Self::default()
    }

    /// Operator opt-out.
    pub fn skipped(target: Option<String>) -> Self {
        Self {
            skipped: true,
            target_limit: target,
            ..Self::default()
        }
    }

    /// Restore attempted and succeeded.
    pub fn restored(target: String) -> Self {
        Self {
            attempted: true,
            succeeded: true,
            target_limit: Some(target),
            ..Self::default()
        }
    }

    /// Restore attempted and failed.
    pub fn failed(target: Option<String>, error: String) -> Self {
        Self {
            attempted: true,
            target_limit: target,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Counters from the built-in load generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Full passes over the operation sequence.
    pub rounds: u64,
    /// Requests sent.
    pub requests: u64,
    /// Requests answered with `rpc-error` or lost to transport failure.
    pub errors: u64,
    /// First message id used.
    pub first_message_id: Option<u64>,
    /// Last message id used.
    pub last_message_id: Option<u64>,
    /// Why the generator stopped early, if it did.
    pub aborted: Option<String>,
}

/// The JSON summary written for every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id.
    pub session_id: SessionId,
    /// Target container.
    pub container_id: String,
    /// Profiled process id, once known.
    pub process_id: Option<u32>,
    /// Profiler kind.
    pub profiler: ProfilerKind,
    /// Session start.
    pub start_time: DateTime<Utc>,
    /// Session end.
    pub end_time: Option<DateTime<Utc>>,
    /// Limit in force before the session raised it.
    pub original_memory_limit: Option<String>,
    /// Limit the session applied.
    pub new_memory_limit: String,
    /// Final status.
    pub status: SessionStatus,
    /// Profiler output path inside the container.
    pub container_output_file: Option<String>,
    /// Profiler output path on the local machine.
    pub local_output_file: Option<PathBuf>,
    /// Classified failure, if any.
    pub error_kind: Option<ErrorKind>,
    /// Errors of individual steps, in order.
    #[serde(default)]
    pub step_errors: Vec<String>,
    /// Degraded conditions that did not fail the session.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Memory limit restoration outcome.
    pub memory_restoration: RestorationOutcome,
    /// Load generator counters, when one ran.
    pub load: Option<LoadReport>,
}

impl SessionSummary {
    /// Fresh summary in `Initializing`.
    pub fn new(
        session_id: SessionId,
        container_id: &str,
        profiler: ProfilerKind,
        new_memory_limit: &str,
    ) -> Self {
        Self {
            session_id,
            container_id: container_id.to_string(),
            process_id: None,
            profiler,
            start_time: Utc::now(),
            end_time: None,
            original_memory_limit: None,
            new_memory_limit: new_memory_limit.to_string(),
            status: SessionStatus::Initializing,
            container_output_file: None,
            local_output_file: None,
            error_kind: None,
            step_errors: Vec::new(),
            warnings: Vec::new(),
            memory_restoration: RestorationOutcome::not_needed(),
            load: None,
        }
    }
}
