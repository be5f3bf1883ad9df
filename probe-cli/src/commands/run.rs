//! Run scenarios.

use anyhow::{Context, Result};
use probe_device::SshShellFactory;
use probe_runner::{Config, Orchestrator, RunFilter};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::container_label;

/// Print what `run` would do.
pub fn dry_run(config: Config, filter: &RunFilter) -> Result<()> {
    let orchestrator = Orchestrator::new(config, Arc::new(SshShellFactory));
    let plan = orchestrator.plan(filter)?;

    println!("=== leakprobe dry run ===");
    println!();
    for planned in &plan {
        let scenario = &planned.scenario;
        println!(
            "{} ({}) / {}: container {}, {}, memory {}, hold {}s, output {}",
            planned.device,
            planned.hostname,
            scenario.name,
            container_label(&scenario.container_id),
            scenario.profiler,
            scenario.memory_limit,
            scenario.duration_secs,
            scenario.output_dir.display()
        );
    }
    println!();
    println!("{} scenario(s) would run", plan.len());
    Ok(())
}

/// Run the selected scenarios. Scenario failures are reported, not returned.
pub async fn run(
    config: Config,
    config_path: &Path,
    filter: &RunFilter,
    cancel: CancellationToken,
) -> Result<()> {
    let orchestrator = Orchestrator::new(config, Arc::new(SshShellFactory))
        .with_config_file(config_path.to_path_buf());
    let outcome = orchestrator
        .run(filter, cancel.clone())
        .await
        .context("Run failed")?;

    let report = &outcome.report;
    println!("=== leakprobe results ===");
    println!();
    for result in &report.results {
        let verdict = if result.is_success() { "ok" } else { "FAILED" };
        print!(
            "{} / {}: {} ({:.1}s)",
            result.device_name,
            result.scenario_name,
            verdict,
            result.duration_secs()
        );
        match &result.error_message {
            Some(message) if !message.is_empty() => println!(" - {}", message),
            _ => println!(),
        }
    }

    let overall = &report.summary.overall;
    println!();
    println!(
        "Total: {}, successful: {}, failed: {} ({})",
        overall.total, overall.successful, overall.failed, overall.success_rate
    );
    if let Some(path) = &outcome.report_path {
        println!("Report: {}", path.display());
    }
    if cancel.is_cancelled() {
        println!("Run was interrupted.");
    }
    Ok(())
}
