//! Check connectivity to one device.

use anyhow::{Context, Result};
use probe_device::SshShellFactory;
use probe_runner::{Config, Orchestrator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the check command.
pub async fn run(config: Config, device: &str, cancel: CancellationToken) -> Result<()> {
    let orchestrator = Orchestrator::new(config, Arc::new(SshShellFactory));
    let info = orchestrator
        .check(device, cancel)
        .await
        .with_context(|| format!("Check of {} failed", device))?;

    println!("=== {} ===", device);
    for (key, value) in &info {
        println!("  {}: {}", key, value);
    }
    Ok(())
}
