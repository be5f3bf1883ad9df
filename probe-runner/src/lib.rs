//! # probe-runner
//!
//! Drives profiling sessions and orchestrates them across devices.
//!
//! - [`config`] - TOML run description and validation
//! - [`profiling`] - one profiling session, from memory raise to restoration
//! - [`load`] - NETCONF load generator run during the hold
//! - [`hooks`] - container setup hooks around a session
//! - [`orchestrator`] - bounded two-level worker pool with per-scenario isolation
//! - [`report`] - consolidated JSON report
//! - [`analysis`] - post-run artifact analysis capability

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod hooks;
pub mod load;
pub mod orchestrator;
pub mod profiling;
pub mod report;

pub use analysis::{AnalysisSink, NoopAnalysis};
pub use config::{Config, ConfigError, GlobalConfig, ManagerSettings};
pub use error::RunnerError;
pub use load::LoadPlan;
pub use orchestrator::{
    DeviceScenarioRunner, Discovery, Orchestrator, PlannedScenario, RunFilter, RunOutcome,
    ScenarioRunner,
};
pub use profiling::{summary_path, ProfilingSession, SessionSettings};
pub use report::{ConsolidatedReport, DeviceSummary, OverallSummary, ReportSummary, RunInfo};
