//! Configuration loading for leakprobe.
//!
//! A run is described by one TOML file: global concurrency settings,
//! optional manager tunables and the list of devices with their scenarios.

use probe_device::ManagerConfig;
use probe_types::{DeviceSpec, ErrorKind};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Run-wide settings.
    #[serde(default)]
    pub global: GlobalConfig,
    /// Container manager and session tunables.
    #[serde(default)]
    pub manager: ManagerSettings,
    /// Devices to test.
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

/// Run-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Devices processed at the same time (default: 3).
    #[serde(default = "default_max_parallel_devices")]
    pub max_parallel_devices: usize,
    /// Scenarios per device processed at the same time (default: 2).
    #[serde(default = "default_max_parallel_scenarios")]
    pub max_parallel_scenarios_per_device: usize,
    /// Where the consolidated report is written (default: results/consolidated).
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Write the consolidated report (default: true).
    #[serde(default = "default_consolidated_report")]
    pub consolidated_report: bool,
}

/// Timing knobs for the container manager and profiling sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerSettings {
    /// Wait after the graceful signal before escalating (default: 5).
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
    /// Wait after the forceful signal before giving up (default: 3).
    #[serde(default = "default_escalation_grace_secs")]
    pub escalation_grace_secs: u64,
    /// Wait after signalling the profiler before copying its report (default: 5).
    #[serde(default = "default_drain_secs")]
    pub drain_secs: u64,
    /// Stats and liveness polling interval during the hold (default: 10).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Timeout for every remote command (default: 30).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

// Default value functions
fn default_max_parallel_devices() -> usize {
    3
}

fn default_max_parallel_scenarios() -> usize {
    2
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("results/consolidated")
}

fn default_consolidated_report() -> bool {
    true
}

fn default_kill_grace_secs() -> u64 {
    5
}

fn default_escalation_grace_secs() -> u64 {
    3
}

fn default_drain_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_parallel_devices: default_max_parallel_devices(),
            max_parallel_scenarios_per_device: default_max_parallel_scenarios(),
            report_dir: default_report_dir(),
            consolidated_report: default_consolidated_report(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            kill_grace_secs: default_kill_grace_secs(),
            escalation_grace_secs: default_escalation_grace_secs(),
            drain_secs: default_drain_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl ManagerSettings {
    /// Container manager configuration with these timings and default patterns.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            kill_grace: Duration::from_secs(self.kill_grace_secs),
            escalation_grace: Duration::from_secs(self.escalation_grace_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            ..ManagerConfig::default()
        }
    }

    /// Drain period after the flush signal.
    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }

    /// Polling interval during the hold.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".into()));
        }
        if self.global.max_parallel_devices == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_devices must be at least 1".into(),
            ));
        }
        if self.global.max_parallel_scenarios_per_device == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_scenarios_per_device must be at least 1".into(),
            ));
        }
        if self.manager.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be at least 1".into(),
            ));
        }

        let mut devices = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(ConfigError::Invalid("device with empty name".into()));
            }
            if !devices.insert(device.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
            if device.connection.hostname.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {} has no hostname",
                    device.name
                )));
            }
            let mut scenarios = HashSet::new();
            for scenario in &device.scenarios {
                if !scenarios.insert(scenario.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate scenario name {} on device {}",
                        scenario.name, device.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Total number of scenarios across all devices.
    pub fn total_scenarios(&self) -> usize {
        self.devices.iter().map(|d| d.scenarios.len()).sum()
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Parsed but inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Failure class.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}
