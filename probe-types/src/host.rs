//! Remote host description.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default command that enters the vendor diagnostic shell.
pub const DEFAULT_DIAG_COMMAND: &str = "diag shell host";

/// How to authenticate against a host.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Password authentication (fed to `sshpass` through the environment).
    Password(String),
    /// Private key file.
    KeyFile(PathBuf),
    /// Whatever the local ssh agent / config provides.
    Agent,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => write!(f, "Password(<redacted>)"),
            Credentials::KeyFile(path) => write!(f, "KeyFile({})", path.display()),
            Credentials::Agent => write!(f, "Agent"),
        }
    }
}

/// A device reachable over SSH.
///
/// Built once per test run from the scenario description and never mutated
/// after a session connects to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    /// Hostname or IP address.
    pub hostname: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user.
    #[serde(default)]
    pub username: String,
    /// Password, if password authentication is used.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Private key file, if key authentication is used.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Timeout for establishing the connection, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Scratch directory on the device for artifacts.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Container commands must run inside the diagnostic shell.
    #[serde(default = "default_true")]
    pub use_diag_shell: bool,
    /// Container commands must be prefixed with `sudo`.
    #[serde(default = "default_true")]
    pub use_sudo_docker: bool,
    /// Command that enters the diagnostic shell.
    #[serde(default = "default_diag_command")]
    pub diag_command: String,
    /// Probe for reachable container tooling before wrapping commands.
    #[serde(default = "default_true")]
    pub probe_docker: bool,
}

fn default_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_working_dir() -> String {
    "/tmp".to_string()
}

fn default_true() -> bool {
    true
}

fn default_diag_command() -> String {
    DEFAULT_DIAG_COMMAND.to_string()
}

impl RemoteHost {
    /// Create a host with default settings and agent authentication.
    pub fn new(hostname: &str, username: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port: default_port(),
            username: username.to_string(),
            password: None,
            key_file: None,
            timeout_secs: default_timeout_secs(),
            working_dir: default_working_dir(),
            use_diag_shell: true,
            use_sudo_docker: true,
            diag_command: default_diag_command(),
            probe_docker: true,
        }
    }

    /// Resolve the credentials to use. A key file wins over a password.
    pub fn credentials(&self) -> Credentials {
        if let Some(key) = &self.key_file {
            Credentials::KeyFile(key.clone())
        } else if let Some(password) = &self.password {
            Credentials::Password(password.clone())
        } else {
            Credentials::Agent
        }
    }

    /// `user@host` destination as understood by ssh/scp.
    pub fn destination(&self) -> String {
        if self.username.is_empty() {
            self.hostname.clone()
        } else {
            format!("{}@{}", self.username, self.hostname)
        }
    }
}
