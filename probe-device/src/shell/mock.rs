//! Mock shell for testing.
//!
//! Responses are matched by substring in registration order; the first rule
//! that matches wins. Unmatched commands succeed with empty output. Every
//! executed command is captured for verification.

use super::{CommandOutput, RemoteShell, ShellError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock shell for testing.
#[derive(Debug, Default)]
pub struct MockShell {
    inner: Arc<Mutex<MockShellInner>>,
}

#[derive(Debug, Default)]
struct MockShellInner {
    opened: bool,
    rules: Vec<(String, CommandOutput)>,
    executed: Vec<String>,
    remote_files: HashMap<String, Vec<u8>>,
    uploads: Vec<(String, String)>,
    fail_next_open: Option<String>,
    fail_next_exec: Option<String>,
    time_out: Vec<String>,
}

impl MockShell {
    /// Create a new mock shell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to commands containing `fragment`.
    pub fn respond(&self, fragment: &str, output: CommandOutput) {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.push((fragment.to_string(), output));
    }

    /// Commands containing `fragment` time out.
    pub fn time_out_on(&self, fragment: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.time_out.push(fragment.to_string());
    }

    /// Place a file on the fake remote host.
    pub fn put_remote_file(&self, path: &str, contents: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.remote_files.insert(path.to_string(), contents.to_vec());
    }

    /// Contents of a file on the fake remote host.
    pub fn remote_file(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.remote_files.get(path).cloned()
    }

    /// All commands executed, in order.
    pub fn executed(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.executed.clone()
    }

    /// Number of executed commands containing `fragment`.
    pub fn count(&self, fragment: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.executed.iter().filter(|c| c.contains(fragment)).count()
    }

    /// `(local, remote)` pairs of uploads.
    pub fn uploads(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().unwrap();
        inner.uploads.clone()
    }

    /// Whether `open()` succeeded.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.opened
    }

    /// Cause the next open() to fail with the given error.
    pub fn fail_next_open(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_open = Some(error.to_string());
    }

    /// Cause the next exec() to fail with the given error.
    pub fn fail_next_exec(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_exec = Some(error.to_string());
    }
}

impl Clone for MockShell {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn open(&self) -> Result<(), ShellError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.fail_next_open.take() {
            return Err(ShellError::ConnectionFailed {
                host: "mock".into(),
                reason,
            });
        }
        inner.opened = true;
        Ok(())
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ShellError> {
        let mut inner = self.inner.lock().unwrap();
        inner.executed.push(command.to_string());

        if let Some(reason) = inner.fail_next_exec.take() {
            return Err(ShellError::ConnectionFailed {
                host: "mock".into(),
                reason,
            });
        }
        if inner.time_out.iter().any(|f| command.contains(f.as_str())) {
            return Err(ShellError::Timeout {
                command: command.to_string(),
                timeout,
            });
        }

        Ok(inner
            .rules
            .iter()
            .find(|(fragment, _)| command.contains(fragment.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        _timeout: Duration,
    ) -> Result<(), ShellError> {
        let contents = tokio::fs::read(local)
            .await
            .map_err(|e| ShellError::TransferFailed(e.to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .uploads
            .push((local.display().to_string(), remote.to_string()));
        inner.remote_files.insert(remote.to_string(), contents);
        Ok(())
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        _timeout: Duration,
    ) -> Result<(), ShellError> {
        let contents = {
            let inner = self.inner.lock().unwrap();
            inner.remote_files.get(remote).cloned()
        };
        let contents = contents
            .ok_or_else(|| ShellError::TransferFailed(format!("no such remote file: {}", remote)))?;
        tokio::fs::write(local, contents)
            .await
            .map_err(|e| ShellError::TransferFailed(e.to_string()))
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.opened = false;
    }
}
