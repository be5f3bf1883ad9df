//! Terminal record of one scenario.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{ErrorKind, SessionSummary};

/// Final status of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// Artifact collected.
    Completed,
    /// Scenario failed; see the error message.
    Failed,
}

/// One entry of the consolidated report.
///
/// Keyed by `(device_name, scenario_name)`; retries append new entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Device the scenario ran against.
    pub device_name: String,
    /// Scenario name.
    pub scenario_name: String,
    /// Final status.
    pub status: ResultStatus,
    /// When the scenario started.
    pub start_time: DateTime<Utc>,
    /// When it finished.
    pub end_time: DateTime<Utc>,
    /// Human-readable failure, if any.
    pub error_message: Option<String>,
    /// Failure class, if any.
    pub error_kind: Option<ErrorKind>,
    /// Session summary, when a session got far enough to have one.
    pub session_summary: Option<SessionSummary>,
    /// Artifacts produced on the local machine.
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
}

impl TestResult {
    /// A failed result with no session behind it.
    pub fn failed(
        device_name: &str,
        scenario_name: &str,
        start_time: DateTime<Utc>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_name: device_name.to_string(),
            scenario_name: scenario_name.to_string(),
            status: ResultStatus::Failed,
            start_time,
            end_time: Utc::now(),
            error_message: Some(message.into()),
            error_kind: Some(kind),
            session_summary: None,
            output_files: Vec::new(),
        }
    }

    /// True when the scenario completed.
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Completed
    }

    /// Wall-clock duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
