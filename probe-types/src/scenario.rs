//! Declarative scenario input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{MemoryLimit, ProfilerKind, RemoteHost, RpcOperation};

/// Default application start command.
pub const DEFAULT_APP_COMMAND: &str = "/usr/bin/netconfd --foreground";

/// A file written into the container before profiling starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Absolute path inside the container.
    pub file: String,
    /// New content (templated).
    pub content: String,
    /// Copy the existing file aside first.
    #[serde(default = "default_true")]
    pub backup: bool,
    /// Suffix for the backup copy.
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
    /// Mode passed to `chmod`, e.g. `755`.
    #[serde(default)]
    pub permissions: Option<String>,
}

/// Commands and file edits run around a profiling session.
///
/// Every string may contain `{{var}}` placeholders; see the template module
/// of the core crate for the variables provided.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupHooks {
    /// Run inside the container before the profiler starts. Failure fails the session.
    #[serde(default)]
    pub pre_commands: Vec<String>,
    /// Files written before the profiler starts. Failure fails the session.
    #[serde(default)]
    pub file_edits: Vec<FileEdit>,
    /// Run after the profiler has started. Failure only warns.
    #[serde(default)]
    pub post_commands: Vec<String>,
    /// Run during cleanup. Failure only warns.
    #[serde(default)]
    pub cleanup_commands: Vec<String>,
    /// Extra template variables.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Where the built-in load generator connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetconfTarget {
    /// Host to connect to; defaults to the device hostname.
    #[serde(default)]
    pub host: Option<String>,
    /// Management port.
    #[serde(default = "default_netconf_port")]
    pub port: u16,
    /// Connect and read timeout, in seconds.
    #[serde(default = "default_netconf_timeout")]
    pub timeout_secs: u64,
    /// Directory of `.xml` RPC files to load in addition to inline operations.
    #[serde(default)]
    pub rpc_dir: Option<PathBuf>,
}

impl Default for NetconfTarget {
    fn default() -> Self {
        Self {
            host: None,
            port: default_netconf_port(),
            timeout_secs: default_netconf_timeout(),
            rpc_dir: None,
        }
    }
}

/// One unit of test work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScenario {
    /// Scenario name, unique within its device.
    pub name: String,
    /// Container id or name; empty means auto-discover.
    #[serde(default)]
    pub container_id: String,
    /// Process to profile; auto-discovered when absent.
    #[serde(default)]
    pub process_pid: Option<u32>,
    /// Memory limit applied for the duration of the session.
    pub memory_limit: MemoryLimit,
    /// Profiler to run under.
    #[serde(default)]
    pub profiler: ProfilerKind,
    /// How long to hold under load.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Local directory for artifacts and the session summary.
    pub output_dir: PathBuf,
    /// Restore the original memory limit afterwards.
    #[serde(default = "default_true")]
    pub restore_memory: bool,
    /// Session id prefix; defaults to `<device>_<scenario>`.
    #[serde(default)]
    pub session_name: Option<String>,
    /// Application start command.
    #[serde(default = "default_app_command")]
    pub app_command: String,
    /// Profiler options replacing the defaults. The output-file option is always appended.
    #[serde(default)]
    pub profiler_options: Option<Vec<String>>,
    /// Load generator target.
    #[serde(default)]
    pub netconf: Option<NetconfTarget>,
    /// Inline RPC operations for the load generator.
    #[serde(default)]
    pub rpcs: Vec<RpcOperation>,
    /// Container setup hooks.
    #[serde(default)]
    pub setup: Option<SetupHooks>,
}

impl TestScenario {
    /// Scenario with defaults for everything but the essentials.
    pub fn new(
        name: &str,
        container_id: &str,
        memory_limit: MemoryLimit,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            name: name.to_string(),
            container_id: container_id.to_string(),
            process_pid: None,
            memory_limit,
            profiler: ProfilerKind::default(),
            duration_secs: default_duration_secs(),
            output_dir,
            restore_memory: true,
            session_name: None,
            app_command: default_app_command(),
            profiler_options: None,
            netconf: None,
            rpcs: Vec::new(),
            setup: None,
        }
    }
}

/// A device and the scenarios to run against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Device name, unique in the run.
    pub name: String,
    /// How to reach it.
    pub connection: RemoteHost,
    /// Work to do.
    #[serde(default)]
    pub scenarios: Vec<TestScenario>,
}

fn default_true() -> bool {
    true
}

fn default_backup_suffix() -> String {
    ".backup".to_string()
}

fn default_netconf_port() -> u16 {
    830
}

fn default_netconf_timeout() -> u64 {
    30
}

fn default_duration_secs() -> u64 {
    60
}

fn default_app_command() -> String {
    DEFAULT_APP_COMMAND.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_defaults_from_toml() {
        let toml_str = r#"
            name = "ui-valgrind"
            container_id = "netconf-ui"
            memory_limit = "5g"
            output_dir = "results/router-1"
        "#;
        let scenario: TestScenario = toml::from_str(toml_str).unwrap();
        assert_eq!(scenario.profiler, ProfilerKind::Valgrind);
        assert_eq!(scenario.duration_secs, 60);
        assert!(scenario.restore_memory);
        assert_eq!(scenario.app_command, DEFAULT_APP_COMMAND);
        assert_eq!(scenario.memory_limit.bytes(), 5 << 30);
        assert!(scenario.netconf.is_none());
    }

    #[test]
    fn device_with_hooks_and_rpcs() {
        let toml_str = r#"
            name = "router-1"
            [connection]
            hostname = "10.0.0.5"
            username = "admin"

            [[scenarios]]
            name = "asan"
            memory_limit = "4g"
            profiler = "asan"
            output_dir = "out"
            [scenarios.netconf]
            port = 2830
            [[scenarios.rpcs]]
            name = "get-config"
            payload = "<get-config><source><running/></source></get-config>"
            repeat_count = 3
            [scenarios.setup]
            pre_commands = ["mkdir -p /tmp/{{session_id}}"]
            [[scenarios.setup.file_edits]]
            file = "/etc/netconfd.conf"
            content = "log-level debug"
        "#;
        let device: DeviceSpec = toml::from_str(toml_str).unwrap();
        let scenario = &device.scenarios[0];
        assert_eq!(scenario.profiler, ProfilerKind::Asan);
        assert_eq!(scenario.netconf.as_ref().unwrap().port, 2830);
        assert_eq!(scenario.netconf.as_ref().unwrap().timeout_secs, 30);
        assert_eq!(scenario.rpcs[0].repeat_count, 3);
        let setup = scenario.setup.as_ref().unwrap();
        assert!(setup.file_edits[0].backup);
        assert_eq!(setup.file_edits[0].backup_suffix, ".backup");
    }
}
