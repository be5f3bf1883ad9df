//! SSH execution via the system `ssh` and `scp` binaries.
//!
//! Uses `tokio::process::Command`. Key and agent authentication run with
//! `BatchMode=yes`; password authentication goes through `sshpass -e` with
//! the password in the `SSHPASS` environment variable, never on argv.

use super::{CommandOutput, RemoteShell, ShellError, ShellFactory};
use async_trait::async_trait;
use probe_types::{Credentials, RemoteHost};
use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Remote shell backed by the OpenSSH client.
#[derive(Debug, Clone)]
pub struct SshShell {
    host: RemoteHost,
}

impl SshShell {
    /// Create a shell for `host`. Nothing is contacted until [`RemoteShell::open`].
    pub fn new(host: RemoteHost) -> Self {
        Self { host }
    }

    fn common_options(&self) -> Vec<String> {
        let mut opts = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.host.timeout_secs.max(1)),
        ];
        match self.host.credentials() {
            Credentials::Password(_) => {
                opts.push("-o".into());
                opts.push("PubkeyAuthentication=no".into());
            }
            Credentials::KeyFile(path) => {
                opts.push("-o".into());
                opts.push("BatchMode=yes".into());
                opts.push("-i".into());
                opts.push(path.display().to_string());
            }
            Credentials::Agent => {
                opts.push("-o".into());
                opts.push("BatchMode=yes".into());
            }
        }
        opts
    }

    /// Build the local command, wrapping it in `sshpass` for passwords.
    fn command(&self, program: &str, args: Vec<String>) -> Command {
        let mut cmd = match self.host.credentials() {
            Credentials::Password(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(program).env("SSHPASS", password);
                cmd
            }
            _ => Command::new(program),
        };
        cmd.args(args).kill_on_drop(true);
        cmd
    }

    fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".into());
        args.push(self.host.port.to_string());
        args.push(self.host.destination());
        args.push(remote_command.to_string());
        args
    }

    fn scp_args(&self, from: String, to: String) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-P".into());
        args.push(self.host.port.to_string());
        args.push(from);
        args.push(to);
        args
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.host.destination(), path)
    }

    async fn run(&self, mut cmd: Command, label: &str, timeout: Duration) -> Result<Output, ShellError> {
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(ShellError::Timeout {
                command: label.to_string(),
                timeout,
            }),
        }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn open(&self) -> Result<(), ShellError> {
        let timeout = Duration::from_secs(self.host.timeout_secs.max(1));
        let cmd = self.command("ssh", self.ssh_args("true"));
        let output = self.run(cmd, "true", timeout).await.map_err(|e| match e {
            ShellError::Timeout { .. } => ShellError::ConnectionFailed {
                host: self.host.hostname.clone(),
                reason: format!("no answer within {}s", timeout.as_secs()),
            },
            other => other,
        })?;

        if !output.status.success() {
            return Err(ShellError::ConnectionFailed {
                host: self.host.hostname.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ShellError> {
        debug!(host = %self.host.hostname, %command, "ssh exec");
        let cmd = self.command("ssh", self.ssh_args(command));
        let output = self.run(cmd, command, timeout).await?;
        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if exit_code == SSH_CONNECTION_FAILURE && output.stdout.is_empty() {
            return Err(ShellError::ConnectionFailed {
                host: self.host.hostname.clone(),
                reason: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
            exit_code,
        })
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        timeout: Duration,
    ) -> Result<(), ShellError> {
        let args = self.scp_args(local.display().to_string(), self.remote_spec(remote));
        let label = format!("scp {} -> {}", local.display(), remote);
        let output = self.run(self.command("scp", args), &label, timeout).await?;
        if !output.status.success() {
            return Err(ShellError::TransferFailed(format!(
                "scp to {}:{} failed: {}",
                self.host.hostname,
                remote,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        timeout: Duration,
    ) -> Result<(), ShellError> {
        let args = self.scp_args(self.remote_spec(remote), local.display().to_string());
        let label = format!("scp {} <- {}", local.display(), remote);
        let output = self.run(self.command("scp", args), &label, timeout).await?;
        if !output.status.success() {
            return Err(ShellError::TransferFailed(format!(
                "scp from {}:{} failed: {}",
                self.host.hostname,
                remote,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Produces [`SshShell`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshShellFactory;

impl ShellFactory for SshShellFactory {
    fn shell_for(&self, host: &RemoteHost) -> Arc<dyn RemoteShell> {
        Arc::new(SshShell::new(host.clone()))
    }
}
