//! List configured devices and scenarios.

use probe_runner::Config;

use super::container_label;

/// Run the list command. Nothing is contacted.
pub fn run(config: &Config) {
    println!("=== leakprobe devices ===");
    println!();
    for device in &config.devices {
        let host = &device.connection;
        println!("{} ({}@{}:{})", device.name, host.username, host.hostname, host.port);
        if device.scenarios.is_empty() {
            println!("  (no scenarios)");
        }
        for scenario in &device.scenarios {
            println!(
                "  - {}: container {}, {}, memory {}, {}s",
                scenario.name,
                container_label(&scenario.container_id),
                scenario.profiler,
                scenario.memory_limit,
                scenario.duration_secs
            );
        }
        println!();
    }
    println!(
        "{} device(s), {} scenario(s)",
        config.devices.len(),
        config.total_scenarios()
    );
}
