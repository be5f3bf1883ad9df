//! Discover target containers.

use anyhow::Result;
use probe_device::SshShellFactory;
use probe_runner::{Config, Orchestrator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the discover command.
pub async fn run(config: Config, device: Option<&str>, cancel: CancellationToken) -> Result<()> {
    let orchestrator = Orchestrator::new(config, Arc::new(SshShellFactory));
    let found = orchestrator.discover(device, cancel).await?;

    println!("=== leakprobe discovery ===");
    for discovery in &found {
        println!();
        println!("{}:", discovery.device);
        match &discovery.container {
            Some(container) => {
                println!("  Container: {} ({})", container.name, container.id);
                println!("  Image:     {}", container.image);
                println!("  Status:    {}", container.status);
                if let Some(limit) = &container.memory_limit {
                    println!("  Memory:    {}", limit);
                }
            }
            None => println!("  Container: NOT FOUND"),
        }
        for process in &discovery.processes {
            println!(
                "  [{}] {} ({} KB): {}",
                process.pid, process.name, process.memory_kb, process.command
            );
        }
        if let Some(error) = &discovery.error {
            println!("  Error: {}", error);
        }
    }
    Ok(())
}
