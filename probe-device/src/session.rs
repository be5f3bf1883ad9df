//! Remote session: one authenticated command and file channel to a device.
//!
//! Every command goes through the preparation pipeline in
//! [`CommandPolicy`] before it reaches the shell. On connect the session can
//! probe whether container tooling is already reachable; if it is, container
//! commands are not wrapped in the diagnostic shell for the rest of the
//! session.
//!
//! A connection failure is returned to the caller as is. There is no
//! reconnect or retry here.

use crate::error::DeviceError;
use crate::shell::{CommandOutput, RemoteShell};
use probe_core::command::{docker, ShellCommand};
use probe_core::CommandPolicy;
use probe_types::RemoteHost;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for a single remote command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_INFO_COMMANDS: &[(&str, &str)] = &[
    ("hostname", "hostname"),
    ("uptime", "uptime"),
    ("memory", "free -h"),
    ("disk", "df -h"),
    ("os_version", "cat /etc/os-release"),
    ("kernel", "uname -a"),
];

/// A session with one device.
pub struct RemoteSession {
    host: RemoteHost,
    shell: Arc<dyn RemoteShell>,
    policy: CommandPolicy,
    in_diag_shell: bool,
    connected: bool,
    default_timeout: Duration,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("host", &self.host.hostname)
            .field("policy", &self.policy)
            .field("in_diag_shell", &self.in_diag_shell)
            .field("connected", &self.connected)
            .finish()
    }
}

impl RemoteSession {
    /// Create a session over `shell`. Nothing is contacted until [`connect`](Self::connect).
    pub fn new(host: RemoteHost, shell: Arc<dyn RemoteShell>) -> Self {
        let policy = CommandPolicy::for_host(&host);
        Self {
            host,
            shell,
            policy,
            in_diag_shell: false,
            connected: false,
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the timeout used by [`exec`](Self::exec) and file transfers.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The host this session talks to.
    pub fn host(&self) -> &RemoteHost {
        &self.host
    }

    /// Returns true once [`connect`](Self::connect) succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns true when container commands are sent without diagnostic-shell wrapping.
    pub fn in_diag_shell(&self) -> bool {
        self.in_diag_shell
    }

    /// Timeout applied by [`exec`](Self::exec).
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Open the channel and decide how container commands are wrapped.
    pub async fn connect(&mut self) -> Result<(), DeviceError> {
        info!(host = %self.host.hostname, port = self.host.port, "connecting");
        self.shell.open().await?;
        self.connected = true;

        if self.policy.use_diag_shell && self.host.probe_docker {
            self.probe_container_tooling().await;
        }
        info!(
            host = %self.host.hostname,
            wrap = self.policy.use_diag_shell && !self.in_diag_shell,
            sudo = self.policy.use_sudo,
            "connected"
        );
        Ok(())
    }

    async fn probe_container_tooling(&mut self) {
        let mut probes = vec![docker::version()];
        if self.policy.use_sudo {
            probes.push(format!("sudo {}", docker::version()));
        }
        for probe in probes {
            match self.shell.exec(&probe, self.default_timeout).await {
                Ok(out) if out.success() => {
                    debug!(host = %self.host.hostname, %probe, "container tooling reachable, not wrapping");
                    self.in_diag_shell = true;
                    return;
                }
                Ok(out) => debug!(%probe, exit_code = out.exit_code, "probe failed"),
                Err(e) => debug!(%probe, error = %e, "probe failed"),
            }
        }

        let wrapped = self.policy.prepare(&docker::version(), false);
        match self.shell.exec(&wrapped, self.default_timeout).await {
            Ok(out) if out.success() => {
                info!(host = %self.host.hostname, "container commands will run in the diagnostic shell")
            }
            _ => warn!(
                host = %self.host.hostname,
                diag = %self.policy.diag_command,
                "container tooling not reachable through the diagnostic shell either"
            ),
        }
    }

    /// Close the channel. Best effort.
    pub async fn disconnect(&mut self) {
        if self.connected {
            self.shell.close().await;
            self.connected = false;
            self.in_diag_shell = false;
            info!(host = %self.host.hostname, "disconnected");
        }
    }

    /// Prepare and run a command. A non-zero exit is returned, not raised.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        let prepared = self.policy.prepare(command, self.in_diag_shell);
        if prepared != command.trim() {
            debug!(original = %command, %prepared, "command prepared");
        } else {
            debug!(%command, "run");
        }
        Ok(self.shell.exec(&prepared, timeout).await?)
    }

    /// Like [`run`](Self::run), but a non-zero exit is an error.
    pub async fn run_ok(&self, command: &str, timeout: Duration) -> Result<CommandOutput, DeviceError> {
        let out = self.run(command, timeout).await?;
        if !out.success() {
            return Err(DeviceError::Command {
                command: command.to_string(),
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }

    /// [`run`](Self::run) with the default timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput, DeviceError> {
        self.run(command, self.default_timeout).await
    }

    /// [`run_ok`](Self::run_ok) with the default timeout.
    pub async fn exec_ok(&self, command: &str) -> Result<CommandOutput, DeviceError> {
        self.run_ok(command, self.default_timeout).await
    }

    /// Upload a local file.
    pub async fn put_file(&self, local: &Path, remote: &str) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        debug!(local = %local.display(), %remote, "upload");
        Ok(self.shell.upload(local, remote, self.default_timeout).await?)
    }

    /// Download a remote file.
    pub async fn get_file(&self, remote: &str, local: &Path) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        debug!(%remote, local = %local.display(), "download");
        Ok(self.shell.download(remote, local, self.default_timeout).await?)
    }

    /// Create a directory on the device.
    pub async fn mkdir_remote(&self, path: &str) -> Result<(), DeviceError> {
        let cmd = ShellCommand::new("mkdir").arg("-p").arg(path).build();
        self.exec_ok(&cmd).await.map(|_| ())
    }

    /// Basic facts about the device.
    ///
    /// A failing probe yields a `Command failed: ...` entry instead of an error.
    pub async fn system_info(&self) -> Result<BTreeMap<String, String>, DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        let mut info = BTreeMap::new();
        for (key, command) in SYSTEM_INFO_COMMANDS {
            let value = match self.exec(command).await {
                Ok(out) if out.success() => out.stdout.trim().to_string(),
                Ok(out) => format!("Command failed: {}", out.stderr.trim()),
                Err(e) => format!("Command failed: {}", e),
            };
            info.insert(key.to_string(), value);
        }
        Ok(info)
    }
}
