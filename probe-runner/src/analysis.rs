//! Post-run analysis capability.
//!
//! The orchestrator hands every collected artifact to an [`AnalysisSink`]
//! once all scenarios have joined. Offline report analysis is optional, so
//! the default sink does nothing.

use async_trait::async_trait;
use probe_types::TestResult;
use std::path::Path;

use crate::error::RunnerError;

/// Receives completed artifacts after a run.
#[async_trait]
pub trait AnalysisSink: Send + Sync {
    /// Called once per artifact of a completed scenario.
    async fn analyze(&self, result: &TestResult, artifact: &Path) -> Result<(), RunnerError>;
}

/// Sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalysis;

#[async_trait]
impl AnalysisSink for NoopAnalysis {
    async fn analyze(&self, _result: &TestResult, _artifact: &Path) -> Result<(), RunnerError> {
        Ok(())
    }
}
