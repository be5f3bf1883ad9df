//! Consolidated run report.

use chrono::{DateTime, Utc};
use probe_types::TestResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::RunnerError;

/// Run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
    /// Configuration file the run was started from.
    pub config_file: Option<PathBuf>,
    /// Devices selected for the run.
    pub total_devices: usize,
    /// Scenarios selected for the run.
    pub total_tests: usize,
    /// Run start.
    pub started: DateTime<Utc>,
    /// Run end.
    pub finished: DateTime<Utc>,
}

/// Overall counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    /// Results recorded.
    pub total: usize,
    /// Completed results.
    pub successful: usize,
    /// Failed results.
    pub failed: usize,
    /// `successful / total` as a percentage with one decimal, e.g. `83.3%`.
    pub success_rate: String,
}

/// Counts for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Results recorded.
    pub total: usize,
    /// Completed results.
    pub successful: usize,
    /// Failed results.
    pub failed: usize,
}

/// Aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Across all devices.
    pub overall: OverallSummary,
    /// Per device name.
    pub by_device: BTreeMap<String, DeviceSummary>,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    /// Run metadata.
    pub test_run_info: RunInfo,
    /// One entry per scenario attempt.
    pub results: Vec<TestResult>,
    /// Aggregates over `results`.
    pub summary: ReportSummary,
}

impl ConsolidatedReport {
    /// Build the report; aggregates are computed from `results`.
    pub fn new(info: RunInfo, results: Vec<TestResult>) -> Self {
        let summary = summarize(&results);
        Self {
            test_run_info: info,
            results,
            summary,
        }
    }

    /// `consolidated_report_<YYYYmmdd_HHMMSS>.json`, from the finish time.
    pub fn file_name(&self) -> String {
        format!(
            "consolidated_report_{}.json",
            self.test_run_info.finished.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the report into `dir`, creating it if needed.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf, RunnerError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        info!(path = %path.display(), "consolidated report written");
        Ok(path)
    }
}

fn summarize(results: &[TestResult]) -> ReportSummary {
    let mut by_device: BTreeMap<String, DeviceSummary> = BTreeMap::new();
    for result in results {
        let entry = by_device.entry(result.device_name.clone()).or_default();
        entry.total += 1;
        if result.is_success() {
            entry.successful += 1;
        } else {
            entry.failed += 1;
        }
    }

    let total = results.len();
    let successful = results.iter().filter(|r| r.is_success()).count();
    let rate = if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64 * 100.0
    };
    ReportSummary {
        overall: OverallSummary {
            total,
            successful,
            failed: total - successful,
            success_rate: format!("{:.1}%", rate),
        },
        by_device,
    }
}
