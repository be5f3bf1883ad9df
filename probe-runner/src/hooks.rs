//! Container setup hooks.
//!
//! Pre-commands and file edits must succeed before the profiler starts;
//! post and cleanup commands are best effort and only produce warnings.

use chrono::Utc;
use probe_core::render;
use probe_device::ContainerManager;
use probe_types::{FileEdit, SetupHooks};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::RunnerError;

/// Template variables for one session.
///
/// Built-in names (`container_id`, `session_id`, `output_file`, `timestamp`)
/// take precedence over user variables of the same name.
pub fn template_vars(
    hooks: &SetupHooks,
    container_id: &str,
    session_id: &str,
    output_file: &str,
) -> BTreeMap<String, String> {
    let mut vars = hooks.variables.clone();
    vars.insert("container_id".into(), container_id.into());
    vars.insert("session_id".into(), session_id.into());
    vars.insert("output_file".into(), output_file.into());
    vars.insert("timestamp".into(), Utc::now().format("%Y%m%d_%H%M%S").to_string());
    vars
}

/// Runs hooks against one container.
pub struct HookRunner<'a> {
    manager: &'a ContainerManager,
    container: &'a str,
    staging_dir: &'a str,
    session_id: &'a str,
    vars: BTreeMap<String, String>,
}

impl<'a> HookRunner<'a> {
    /// Hooks for `container`; uploads are staged in `staging_dir` on the device.
    pub fn new(
        manager: &'a ContainerManager,
        container: &'a str,
        staging_dir: &'a str,
        session_id: &'a str,
        vars: BTreeMap<String, String>,
    ) -> Self {
        Self {
            manager,
            container,
            staging_dir,
            session_id,
            vars,
        }
    }

    /// Pre-commands, then file edits. The first failure aborts.
    pub async fn prepare(&self, hooks: &SetupHooks) -> Result<(), RunnerError> {
        for command in &hooks.pre_commands {
            let command = render(command, &self.vars);
            info!(container = %self.container, %command, "pre-command");
            let out = self.manager.exec_in_container(self.container, &command).await?;
            if !out.success() {
                return Err(RunnerError::Setup(format!(
                    "pre-command `{}` exited with {}: {}",
                    command,
                    out.exit_code,
                    out.stderr.trim()
                )));
            }
        }
        for (index, edit) in hooks.file_edits.iter().enumerate() {
            self.apply_edit(index, edit).await?;
        }
        Ok(())
    }

    /// Post-commands. Returns one warning per failure.
    pub async fn after_start(&self, hooks: &SetupHooks) -> Vec<String> {
        self.best_effort("post-command", &hooks.post_commands).await
    }

    /// Cleanup commands. Returns one warning per failure.
    pub async fn cleanup(&self, hooks: &SetupHooks) -> Vec<String> {
        self.best_effort("cleanup command", &hooks.cleanup_commands)
            .await
    }

    async fn best_effort(&self, label: &str, commands: &[String]) -> Vec<String> {
        let mut warnings = Vec::new();
        for command in commands {
            let command = render(command, &self.vars);
            debug!(container = %self.container, %command, "{}", label);
            let failure = match self.manager.exec_in_container(self.container, &command).await {
                Ok(out) if out.success() => continue,
                Ok(out) => format!("exited with {}: {}", out.exit_code, out.stderr.trim()),
                Err(e) => e.to_string(),
            };
            let warning = format!("{} `{}` failed: {}", label, command, failure);
            warn!(container = %self.container, "{}", warning);
            warnings.push(warning);
        }
        warnings
    }

    async fn apply_edit(&self, index: usize, edit: &FileEdit) -> Result<(), RunnerError> {
        let target = render(&edit.file, &self.vars);
        if edit.backup {
            let backup = format!("{}{}", target, edit.backup_suffix);
            if !self
                .manager
                .backup_container_file(self.container, &target, &backup)
                .await?
            {
                debug!(file = %target, "nothing to back up");
            }
        }

        let local = local_scratch(self.session_id, index);
        tokio::fs::write(&local, render(&edit.content, &self.vars)).await?;
        let staging = format!(
            "{}/{}_edit_{}",
            self.staging_dir.trim_end_matches('/'),
            self.session_id,
            index
        );
        let uploaded = self
            .manager
            .put_container_file(self.container, &local, &staging, &target)
            .await;
        if let Err(e) = tokio::fs::remove_file(&local).await {
            debug!(path = %local.display(), error = %e, "scratch file not removed");
        }
        uploaded?;

        if let Some(mode) = &edit.permissions {
            self.manager
                .chmod_container_file(self.container, mode, &target)
                .await?;
        }
        info!(container = %self.container, file = %target, "file edit applied");
        Ok(())
    }
}

fn local_scratch(session_id: &str, index: usize) -> PathBuf {
    std::env::temp_dir().join(format!("leakprobe_{}_edit_{}", session_id, index))
}
