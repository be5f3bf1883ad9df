//! Container and process manager.
//!
//! Drives containers on one device through a [`RemoteSession`]. Nothing is
//! cached: every call re-reads the state it needs, because the processes it
//! looks at are killed and restarted underneath it.
//!
//! # Profiled run
//!
//! ```text
//! set_memory_limit → kill_managed_processes → start_under_profiler
//!     → signal_profiler → copy_artifact → stop_and_restore_normally
//! ```
//!
//! Each step is a separate call. Sequencing, and running cleanup when a
//! later step fails, is the caller's job.

use crate::error::DeviceError;
use crate::session::RemoteSession;
use crate::shell::CommandOutput;
use probe_core::command::{docker, ShellCommand, Signal};
use probe_core::{
    classify, matches_alternation, parse_inspect_line, parse_pgrep, parse_ps, parse_ps_line,
    parse_ps_pid, parse_stats, ProfilerInvocation, BROAD_KILL_PATTERNS, DEFAULT_IMAGE_PATTERNS,
    DEFAULT_MANAGED_PATTERNS, DEFAULT_NAME_PATTERNS, PGREP_PATTERNS, VERIFY_PATTERN,
};
use probe_types::{Container, ContainerStats, ManagedProcess, MemoryLimit};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Wait after the first signal before re-checking.
    pub kill_grace: Duration,
    /// Wait after the forceful signal before giving up.
    pub escalation_grace: Duration,
    /// Timeout for every remote command.
    pub command_timeout: Duration,
    /// Wait after a detached launch before looking for the new process.
    pub start_settle: Duration,
    /// Process-list lookups for a freshly launched profiler.
    pub pid_lookup_attempts: u32,
    /// Wait between those lookups.
    pub pid_lookup_interval: Duration,
    /// Container name patterns, in priority order.
    pub name_patterns: Vec<String>,
    /// Image patterns tried after the name patterns.
    pub image_patterns: Vec<String>,
    /// Alternation a container's `ps aux` must match to count as verified.
    pub verify_pattern: String,
    /// Command-line fragments that mark a managed process.
    pub managed_patterns: Vec<String>,
    /// Working directory for detached launches.
    pub workdir: Option<String>,
    /// Allowed relative difference when verifying a memory limit.
    pub memory_tolerance: f64,
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_secs(5),
            escalation_grace: Duration::from_secs(3),
            command_timeout: Duration::from_secs(30),
            start_settle: Duration::from_secs(2),
            pid_lookup_attempts: 5,
            pid_lookup_interval: Duration::from_secs(1),
            name_patterns: owned(DEFAULT_NAME_PATTERNS),
            image_patterns: owned(DEFAULT_IMAGE_PATTERNS),
            verify_pattern: VERIFY_PATTERN.to_string(),
            managed_patterns: owned(DEFAULT_MANAGED_PATTERNS),
            workdir: None,
            memory_tolerance: 0.01,
        }
    }
}

/// Outcome of [`ContainerManager::kill_managed_processes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KillReport {
    /// Processes that received the first signal.
    pub signalled: Vec<ManagedProcess>,
    /// Pids that needed the forceful signal.
    pub escalated: Vec<u32>,
}

/// Container and process operations on one device.
#[derive(Debug, Clone)]
pub struct ContainerManager {
    session: Arc<RemoteSession>,
    config: ManagerConfig,
}

impl ContainerManager {
    /// Create a manager over a connected session.
    pub fn new(session: Arc<RemoteSession>, config: ManagerConfig) -> Self {
        Self { session, config }
    }

    /// The underlying session.
    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    /// The manager's tunables.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput, DeviceError> {
        self.session.run(command, self.config.command_timeout).await
    }

    async fn exec_ok(&self, command: &str) -> Result<CommandOutput, DeviceError> {
        self.session.run_ok(command, self.config.command_timeout).await
    }

    // =======================================================================
    // Discovery
    // =======================================================================

    /// Find the container hosting the application.
    ///
    /// Name patterns are tried in order (`preferred`, or the configured
    /// defaults when empty), one filtered `docker ps` per pattern. The first
    /// candidate whose process list matches the verify pattern wins and no
    /// further queries are issued. Image patterns are tried the same way
    /// when no name matched.
    pub async fn find_target_container(
        &self,
        preferred: &[String],
    ) -> Result<Container, DeviceError> {
        let names = if preferred.is_empty() {
            self.config.name_patterns.as_slice()
        } else {
            preferred
        };

        for pattern in names {
            if let Some(found) = self.search(&docker::ps_by_name(pattern), pattern).await? {
                return Ok(found);
            }
        }
        for pattern in &self.config.image_patterns {
            if let Some(found) = self.search(&docker::ps_by_image(pattern), pattern).await? {
                return Ok(found);
            }
        }
        Err(DeviceError::ContainerNotFound(names.join(",")))
    }

    async fn search(&self, query: &str, pattern: &str) -> Result<Option<Container>, DeviceError> {
        let out = self.exec(query).await?;
        if !out.success() {
            warn!(%pattern, exit_code = out.exit_code, stderr = %out.stderr.trim(), "container query failed");
            return Ok(None);
        }
        for candidate in out.stdout.lines().filter_map(parse_ps_line) {
            if self.hosts_application(&candidate.id).await? {
                info!(%pattern, id = %candidate.id, name = %candidate.name, "target container found");
                return Ok(Some(candidate));
            }
            debug!(%pattern, name = %candidate.name, "candidate does not host the application");
        }
        Ok(None)
    }

    async fn hosts_application(&self, container: &str) -> Result<bool, DeviceError> {
        let out = self.exec(&docker::ps_aux(container)).await?;
        Ok(out.success()
            && out
                .stdout
                .lines()
                .any(|l| matches_alternation(l, &self.config.verify_pattern) && !l.contains("ps aux")))
    }

    /// Name, image, status, ports and current resource usage of a container.
    pub async fn inspect_container(&self, container: &str) -> Result<Container, DeviceError> {
        let out = self.exec(&docker::inspect(container)).await?;
        if !out.success() {
            return Err(DeviceError::ContainerNotFound(container.to_string()));
        }
        let (name, image, status, created) = parse_inspect_line(&out.stdout)
            .ok_or_else(|| DeviceError::Parse(out.stdout.trim().to_string()))?;

        let mut info = Container::new(container, &name, &image, &status);
        info.created = Some(created);

        let ports = self.exec(&docker::port(container)).await?;
        if ports.success() {
            info.ports = ports
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
        }
        match self.container_stats(container).await {
            Ok(stats) => {
                info.memory_limit = Some(stats.memory_limit);
                info.memory_usage = Some(stats.memory_usage);
                info.cpu_percent = Some(stats.cpu_percent);
            }
            Err(e) => debug!(%container, error = %e, "no stats"),
        }
        Ok(info)
    }

    // =======================================================================
    // Processes
    // =======================================================================

    /// Every process in the container.
    pub async fn list_processes(&self, container: &str) -> Result<Vec<ManagedProcess>, DeviceError> {
        let out = self.exec_ok(&docker::ps_aux(container)).await?;
        Ok(parse_ps(&out.stdout)
            .into_iter()
            .map(|e| ManagedProcess {
                container_id: container.to_string(),
                pid: e.pid,
                name: executable_name(&e.command),
                command: e.command,
                memory_kb: e.rss_kb,
                cpu_percent: e.cpu_percent,
            })
            .collect())
    }

    /// Processes of the application under test.
    ///
    /// `ps aux` is parsed first; `pgrep -f` then adds pids the listing missed.
    pub async fn find_managed_processes(
        &self,
        container: &str,
    ) -> Result<Vec<ManagedProcess>, DeviceError> {
        let patterns: Vec<&str> = self.config.managed_patterns.iter().map(String::as_str).collect();

        let mut found: Vec<ManagedProcess> = self
            .list_processes(container)
            .await?
            .into_iter()
            .filter_map(|mut p| {
                let category = classify(&p.command, &patterns)?;
                p.name = category.to_string();
                Some(p)
            })
            .collect();

        for pattern in PGREP_PATTERNS {
            let out = self.exec(&docker::pgrep(container, pattern)).await?;
            if !out.success() {
                continue;
            }
            for pid in parse_pgrep(&out.stdout) {
                if found.iter().any(|p| p.pid == pid) {
                    continue;
                }
                let detail = self.exec(&docker::ps_pid(container, pid)).await?;
                let Some(entry) = parse_ps_pid(&detail.stdout) else {
                    continue;
                };
                if let Some(category) = classify(&entry.command, &patterns) {
                    debug!(%container, pid, "process found by pgrep only");
                    found.push(ManagedProcess {
                        container_id: container.to_string(),
                        pid,
                        name: category.to_string(),
                        command: entry.command,
                        memory_kb: entry.rss_kb,
                        cpu_percent: entry.cpu_percent,
                    });
                }
            }
        }
        Ok(found)
    }

    async fn send_signal(&self, container: &str, signal: Signal, pids: &[u32]) {
        for pid in pids {
            match self.exec(&docker::kill(container, signal, *pid)).await {
                Ok(out) if !out.success() => debug!(%container, pid, %signal, "kill had no effect"),
                Err(e) => warn!(%container, pid, %signal, error = %e, "kill failed"),
                _ => {}
            }
        }
        for pattern in BROAD_KILL_PATTERNS {
            // Exit status 1 just means nothing matched.
            let _ = self.exec(&docker::pkill(container, signal, pattern)).await;
            let _ = self.exec(&docker::killall(container, signal, pattern)).await;
        }
    }

    /// Signal every managed process, escalating to KILL for survivors.
    ///
    /// Fails with [`DeviceError::Escalation`] only when processes are still
    /// alive after the forceful signal.
    pub async fn kill_managed_processes(
        &self,
        container: &str,
        signal: Signal,
    ) -> Result<KillReport, DeviceError> {
        let targets = self.find_managed_processes(container).await?;
        let pids: Vec<u32> = targets.iter().map(|p| p.pid).collect();
        info!(%container, %signal, ?pids, "stopping managed processes");
        self.send_signal(container, signal, &pids).await;

        let mut report = KillReport {
            signalled: targets,
            escalated: Vec::new(),
        };
        if report.signalled.is_empty() {
            return Ok(report);
        }

        tokio::time::sleep(self.config.kill_grace).await;
        let survivors: Vec<u32> = self
            .find_managed_processes(container)
            .await?
            .iter()
            .map(|p| p.pid)
            .collect();
        if survivors.is_empty() {
            return Ok(report);
        }

        warn!(%container, ?survivors, "processes survived {}, escalating to KILL", signal);
        self.send_signal(container, Signal::Kill, &survivors).await;
        report.escalated = survivors;

        tokio::time::sleep(self.config.escalation_grace).await;
        let remaining: Vec<u32> = self
            .find_managed_processes(container)
            .await?
            .iter()
            .map(|p| p.pid)
            .collect();
        if !remaining.is_empty() {
            return Err(DeviceError::Escalation {
                container: container.to_string(),
                pids: remaining,
            });
        }
        Ok(report)
    }

    /// Whether `pid` is alive in the container.
    pub async fn is_process_running(&self, container: &str, pid: u32) -> Result<bool, DeviceError> {
        let out = self.exec(&docker::ps_pid(container, pid)).await?;
        Ok(out.success() && parse_ps_pid(&out.stdout).is_some())
    }

    // =======================================================================
    // Memory
    // =======================================================================

    /// One stats sample.
    pub async fn container_stats(&self, container: &str) -> Result<ContainerStats, DeviceError> {
        let out = self.exec_ok(&docker::stats(container)).await?;
        parse_stats(&out.stdout).map_err(|e| DeviceError::Parse(e.to_string()))
    }

    /// Memory limit currently in force.
    pub async fn current_memory_limit(&self, container: &str) -> Result<MemoryLimit, DeviceError> {
        Ok(self.container_stats(container).await?.memory_limit)
    }

    /// Update the memory limit live and verify it took effect.
    pub async fn set_memory_limit(
        &self,
        container: &str,
        limit: &MemoryLimit,
    ) -> Result<ContainerStats, DeviceError> {
        info!(%container, %limit, "setting memory limit");
        self.exec_ok(&docker::update_memory(container, limit.as_str()))
            .await?;

        let stats = self.container_stats(container).await?;
        if !limit.approx_eq(&stats.memory_limit, self.config.memory_tolerance) {
            return Err(DeviceError::Verification {
                container: container.to_string(),
                expected: limit.to_string(),
                observed: stats.memory_limit.to_string(),
            });
        }
        debug!(%container, observed = %stats.memory_limit, "memory limit verified");
        Ok(stats)
    }

    // =======================================================================
    // Profiler lifecycle
    // =======================================================================

    /// Replace the running application with one under the profiler.
    ///
    /// Returns the pid of the profiled process.
    pub async fn start_under_profiler(
        &self,
        container: &str,
        invocation: &ProfilerInvocation,
    ) -> Result<u32, DeviceError> {
        self.kill_managed_processes(container, Signal::Term).await?;

        let binary = invocation.required_binary();
        let which = self.exec(&docker::which(container, binary)).await?;
        if !which.success() {
            return Err(DeviceError::ProfilerUnavailable {
                container: container.to_string(),
                binary: binary.to_string(),
            });
        }

        if let Some(dir) = Path::new(&invocation.output_path).parent() {
            self.ensure_container_dir(container, &dir.to_string_lossy())
                .await?;
        }
        self.remove_container_file(container, &invocation.output_path)
            .await;

        let line = invocation.command_line();
        info!(%container, command = %line, "starting under {}", invocation.kind);
        self.exec_ok(&docker::exec_detached(
            container,
            self.config.workdir.as_deref(),
            &line,
        ))
        .await?;

        tokio::time::sleep(self.config.start_settle).await;
        let marker = invocation.process_marker();
        for attempt in 1..=self.config.pid_lookup_attempts.max(1) {
            let processes = self.list_processes(container).await?;
            if let Some(p) = processes
                .iter()
                .find(|p| classify(&p.command, &[marker.as_str()]).is_some())
            {
                info!(%container, pid = p.pid, "profiler attached");
                return Ok(p.pid);
            }
            debug!(%container, attempt, %marker, "profiled process not visible yet");
            tokio::time::sleep(self.config.pid_lookup_interval).await;
        }
        Err(DeviceError::ProfilerNotStarted(container.to_string()))
    }

    /// Signal the profiled process so it writes its report.
    ///
    /// Returns false when no matching process was running.
    pub async fn signal_profiler(
        &self,
        container: &str,
        invocation: &ProfilerInvocation,
        signal: Signal,
    ) -> Result<bool, DeviceError> {
        let marker = invocation.process_marker();
        let out = self.exec(&docker::pkill(container, signal, &marker)).await?;
        if !out.success() {
            warn!(%container, %marker, "no profiled process to signal");
        }
        Ok(out.success())
    }

    /// Leave the complete report at the invocation's output path.
    pub async fn finalize_artifact(
        &self,
        container: &str,
        invocation: &ProfilerInvocation,
    ) -> Result<(), DeviceError> {
        if let Some(script) = invocation.finalize_script() {
            self.exec_ok(&docker::exec_sh(container, &script)).await?;
        }
        Ok(())
    }

    /// Kill the profiler and every managed process, then start the
    /// application normally.
    pub async fn stop_and_restore_normally(
        &self,
        container: &str,
        app_command: &str,
    ) -> Result<(), DeviceError> {
        self.exec(&docker::pkill(container, Signal::Kill, "valgrind"))
            .await?;
        self.kill_managed_processes(container, Signal::Kill).await?;

        info!(%container, command = %app_command, "restarting application normally");
        self.exec_ok(&docker::exec_detached(
            container,
            self.config.workdir.as_deref(),
            app_command,
        ))
        .await?;
        Ok(())
    }

    // =======================================================================
    // Files
    // =======================================================================

    /// Copy a file out of the container onto the device.
    pub async fn copy_artifact(
        &self,
        container: &str,
        container_path: &str,
        host_path: &str,
    ) -> Result<(), DeviceError> {
        self.exec_ok(&docker::cp_from(container, container_path, host_path))
            .await?;
        debug!(%container, %container_path, %host_path, "artifact copied");
        Ok(())
    }

    /// Copy a file out of the container all the way to the local machine.
    ///
    /// The device staging copy and the in-container file are removed
    /// afterwards, best effort.
    pub async fn collect_artifact(
        &self,
        container: &str,
        container_path: &str,
        staging_path: &str,
        local: &Path,
    ) -> Result<(), DeviceError> {
        self.copy_artifact(container, container_path, staging_path)
            .await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.session.get_file(staging_path, local).await?;
        info!(%container, local = %local.display(), "artifact collected");

        let rm = ShellCommand::new("rm").arg("-f").arg(staging_path).build();
        if let Err(e) = self.exec(&rm).await {
            debug!(error = %e, "staging cleanup failed");
        }
        self.remove_container_file(container, container_path).await;
        Ok(())
    }

    /// Upload a local file and copy it into the container.
    pub async fn put_container_file(
        &self,
        container: &str,
        local: &Path,
        staging_path: &str,
        container_path: &str,
    ) -> Result<(), DeviceError> {
        self.session.put_file(local, staging_path).await?;
        self.exec_ok(&docker::cp_to(staging_path, container, container_path))
            .await?;
        let rm = ShellCommand::new("rm").arg("-f").arg(staging_path).build();
        let _ = self.exec(&rm).await;
        Ok(())
    }

    /// Copy a file inside the container. Returns false if the source is absent.
    pub async fn backup_container_file(
        &self,
        container: &str,
        path: &str,
        backup: &str,
    ) -> Result<bool, DeviceError> {
        let out = self.exec(&docker::exec(container, ["cp", path, backup])).await?;
        Ok(out.success())
    }

    /// Change a file's mode inside the container.
    pub async fn chmod_container_file(
        &self,
        container: &str,
        mode: &str,
        path: &str,
    ) -> Result<(), DeviceError> {
        self.exec_ok(&docker::exec(container, ["chmod", mode, path]))
            .await
            .map(|_| ())
    }

    /// Remove a file inside the container. Best effort.
    pub async fn remove_container_file(&self, container: &str, path: &str) {
        if let Err(e) = self.exec(&docker::rm(container, path)).await {
            debug!(%container, %path, error = %e, "remove failed");
        }
    }

    /// Create a directory inside the container.
    pub async fn ensure_container_dir(&self, container: &str, path: &str) -> Result<(), DeviceError> {
        self.exec_ok(&docker::mkdir(container, path)).await.map(|_| ())
    }

    // =======================================================================
    // Misc
    // =======================================================================

    /// Run a shell script inside the container. A non-zero exit is returned.
    pub async fn exec_in_container(
        &self,
        container: &str,
        script: &str,
    ) -> Result<CommandOutput, DeviceError> {
        self.exec(&docker::exec_sh(container, script)).await
    }

    /// Recent log lines.
    pub async fn container_logs(&self, container: &str, lines: u32) -> Result<String, DeviceError> {
        let out = self.exec_ok(&docker::logs(container, lines)).await?;
        Ok(out.stdout)
    }
}

fn executable_name(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .map(|w| w.rsplit('/').next().unwrap_or(w))
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{FakeContainer, FakeDockerHost, MockShell};
    use probe_types::{ErrorKind, ProfilerKind, RemoteHost};

    const APP: &str = "/usr/bin/netconfd --foreground";

    async fn manager_on(shell: impl crate::shell::RemoteShell + 'static) -> ContainerManager {
        let mut session = RemoteSession::new(RemoteHost::new("dev", "admin"), Arc::new(shell));
        session.connect().await.unwrap();
        ContainerManager::new(Arc::new(session), ManagerConfig::default())
    }

    fn device() -> FakeDockerHost {
        FakeDockerHost::new()
            .with_container(FakeContainer::new("aaa111", "web-ui", "nginx:1.25").with_process("nginx: master"))
            .with_container(
                FakeContainer::new("bbb222", "netconf-ui", "vendor/netconf:1.2")
                    .with_process(APP)
                    .with_process("/usr/sbin/sysrepod -d"),
            )
    }

    // ===========================================
    // Discovery
    // ===========================================

    #[tokio::test]
    async fn discovery_skips_unverified_candidates() {
        let host = device();
        let mgr = manager_on(host.clone()).await;
        let found = mgr
            .find_target_container(&["ui".to_string()])
            .await
            .unwrap();
        assert_eq!(found.name, "netconf-ui");
    }

    #[tokio::test]
    async fn discovery_falls_back_to_image() {
        let host = FakeDockerHost::new().with_container(
            FakeContainer::new("ccc333", "app", "vendor/confd:7").with_process("/opt/confd/bin/confd"),
        );
        let mgr = manager_on(host.clone()).await;
        let found = mgr
            .find_target_container(&["nope".to_string()])
            .await
            .unwrap();
        assert_eq!(found.id, "ccc333");
        assert_eq!(host.count_docker("ancestor="), 2);
    }

    #[tokio::test]
    async fn discovery_not_found() {
        let mgr = manager_on(FakeDockerHost::new()).await;
        let err = mgr.find_target_container(&[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn inspect_reports_limits_and_ports() {
        let mgr = manager_on(device()).await;
        let info = mgr.inspect_container("netconf-ui").await.unwrap();
        assert_eq!(info.image, "vendor/netconf:1.2");
        assert_eq!(info.status, "running");
        assert_eq!(info.memory_limit.unwrap().bytes(), 2 << 30);
        assert_eq!(info.ports.len(), 1);
        assert!(mgr.inspect_container("missing").await.is_err());
    }

    // ===========================================
    // Processes
    // ===========================================

    #[tokio::test]
    async fn managed_processes_are_classified() {
        let mgr = manager_on(device()).await;
        let procs = mgr.find_managed_processes("netconf-ui").await.unwrap();
        let names: Vec<_> = procs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["netconfd", "sysrepod"]);
        assert!(procs.iter().all(|p| p.container_id == "netconf-ui"));
    }

    #[tokio::test]
    async fn pgrep_adds_missed_pids() {
        let shell = MockShell::new();
        shell.respond("docker --version", CommandOutput::ok("Docker version 24"));
        shell.respond(
            "ps aux",
            CommandOutput::ok("USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND\n"),
        );
        shell.respond("pgrep -f netconfd", CommandOutput::ok("77\n"));
        shell.respond("pgrep", CommandOutput::failed(1, ""));
        shell.respond(
            "ps -p 77",
            CommandOutput::ok("   77  1.0 2048 /usr/bin/netconfd --foreground\n"),
        );
        let mgr = manager_on(shell).await;
        let procs = mgr.find_managed_processes("c").await.unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].pid, 77);
        assert_eq!(procs[0].memory_kb, 2048);
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_processes_need_no_escalation() {
        let host = device();
        let mgr = manager_on(host.clone()).await;
        let report = mgr
            .kill_managed_processes("netconf-ui", Signal::Term)
            .await
            .unwrap();
        assert_eq!(report.signalled.len(), 2);
        assert!(report.escalated.is_empty());
        assert_eq!(host.count_docker("-KILL"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_kill_returns_immediately() {
        let host = FakeDockerHost::new().with_container(FakeContainer::new("x", "empty", "img"));
        let mgr = manager_on(host).await;
        let start = tokio::time::Instant::now();
        let report = mgr.kill_managed_processes("empty", Signal::Term).await.unwrap();
        assert!(report.signalled.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unkillable_process_is_an_escalation_error() {
        let host = device().resist_kill("netconfd");
        let mgr = manager_on(host.clone()).await;
        let err = mgr
            .kill_managed_processes("netconf-ui", Signal::Term)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Escalation);
    }

    // ===========================================
    // Memory
    // ===========================================

    #[tokio::test]
    async fn memory_limit_is_verified() {
        let host = device();
        let mgr = manager_on(host.clone()).await;
        let stats = mgr
            .set_memory_limit("netconf-ui", &MemoryLimit::parse("5g").unwrap())
            .await
            .unwrap();
        assert_eq!(stats.memory_limit.bytes(), 5 << 30);
        assert_eq!(host.memory_limit("netconf-ui"), Some(5 << 30));
    }

    #[tokio::test]
    async fn ignored_memory_update_fails_verification() {
        let host = device().ignore_memory_updates();
        let mgr = manager_on(host).await;
        let err = mgr
            .set_memory_limit("netconf-ui", &MemoryLimit::parse("5g").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Verification { .. }));
    }

    // ===========================================
    // Profiler lifecycle
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn valgrind_start_stop_collect() {
        let host = device();
        let mgr = manager_on(host.clone()).await;
        let output = ProfilerInvocation::artifact_path(ProfilerKind::Valgrind, "s1");
        let inv = ProfilerInvocation::new(ProfilerKind::Valgrind, APP, &output, None);

        let pid = mgr.start_under_profiler("netconf-ui", &inv).await.unwrap();
        let procs = host.processes("netconf-ui");
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].0, pid);
        assert!(procs[0].1.starts_with("valgrind --tool=memcheck"));
        assert!(procs[0].1.ends_with(APP));

        assert!(mgr.signal_profiler("netconf-ui", &inv, Signal::Term).await.unwrap());
        mgr.finalize_artifact("netconf-ui", &inv).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("out").join("s1_valgrind.xml");
        mgr.collect_artifact("netconf-ui", &output, "/tmp/s1_valgrind.xml", &local)
            .await
            .unwrap();
        let report = std::fs::read_to_string(&local).unwrap();
        assert!(report.contains("<valgrindoutput>"));
        assert!(host.host_file("/tmp/s1_valgrind.xml").is_none());
        assert!(host.container_file("netconf-ui", &output).is_none());

        mgr.stop_and_restore_normally("netconf-ui", APP).await.unwrap();
        let procs = host.processes("netconf-ui");
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].1, APP);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_profiler_binary() {
        let host = FakeDockerHost::new().with_container(
            FakeContainer::new("bbb", "netconf-ui", "img")
                .with_process(APP)
                .without_binary("valgrind"),
        );
        let mgr = manager_on(host).await;
        let inv = ProfilerInvocation::new(ProfilerKind::Valgrind, APP, "/tmp/memory_analysis/x.xml", None);
        let err = mgr.start_under_profiler("netconf-ui", &inv).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProfilerUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn asan_logs_are_consolidated() {
        let host = device();
        let mgr = manager_on(host.clone()).await;
        let output = ProfilerInvocation::artifact_path(ProfilerKind::Asan, "s2");
        let inv = ProfilerInvocation::new(ProfilerKind::Asan, APP, &output, None);

        let pid = mgr.start_under_profiler("netconf-ui", &inv).await.unwrap();
        assert!(mgr.is_process_running("netconf-ui", pid).await.unwrap());
        mgr.signal_profiler("netconf-ui", &inv, Signal::Term).await.unwrap();
        mgr.finalize_artifact("netconf-ui", &inv).await.unwrap();

        let log = host.container_file("netconf-ui", &output).unwrap();
        assert!(String::from_utf8(log).unwrap().contains("LeakSanitizer"));
    }

    #[test]
    fn executable_names() {
        assert_eq!(executable_name("/usr/bin/netconfd --foreground"), "netconfd");
        assert_eq!(executable_name("sh"), "sh");
        assert_eq!(executable_name(""), "");
    }
}
