//! Profiling session driver.
//!
//! Executes the actions of [`SessionMachine`] against a container manager:
//! raise the memory limit, restart the application under the profiler, hold
//! under load, collect the report and put everything back. Every step
//! reports back to the machine; the machine decides what comes next and
//! always routes through cleanup, so memory restoration is attempted exactly
//! once whenever a raise was attempted.

use chrono::Utc;
use probe_core::{ProfilerInvocation, SessionAction, SessionEvent, SessionMachine, Signal};
use probe_device::{ContainerManager, DeviceError};
use probe_types::{
    ErrorKind, MemoryLimit, RestorationOutcome, SessionId, SessionStatus, SessionSummary,
    SetupHooks, TestScenario,
};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ManagerSettings;
use crate::error::RunnerError;
use crate::hooks::{template_vars, HookRunner};
use crate::load::{run_load, LoadPlan};

/// Timings of the session itself; the manager carries its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Wait after signalling the profiler before collecting its report.
    pub drain: Duration,
    /// Stats and liveness polling interval during the hold.
    pub poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ManagerSettings::default())
    }
}

impl From<&ManagerSettings> for SessionSettings {
    fn from(settings: &ManagerSettings) -> Self {
        Self {
            drain: settings.drain(),
            poll_interval: settings.poll_interval(),
        }
    }
}

/// `<output_dir>/<session>_summary.json`.
pub fn summary_path(output_dir: &Path, session_id: &SessionId) -> PathBuf {
    output_dir.join(format!("{}_summary.json", session_id))
}

/// One profiling attempt of one scenario.
pub struct ProfilingSession {
    manager: ContainerManager,
    scenario: TestScenario,
    hooks: SetupHooks,
    settings: SessionSettings,
    cancel: CancellationToken,
    session_id: SessionId,
    summary: SessionSummary,
    container: String,
    invocation: Option<ProfilerInvocation>,
    original_limit: Option<MemoryLimit>,
    original_error: Option<(ErrorKind, String)>,
    cleanup_error: Option<ErrorKind>,
}

impl ProfilingSession {
    /// Prepare a session; nothing touches the device until [`run`](Self::run).
    pub fn new(
        manager: ContainerManager,
        device_name: &str,
        scenario: TestScenario,
        settings: SessionSettings,
        cancel: CancellationToken,
    ) -> Self {
        let prefix = scenario
            .session_name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", device_name, scenario.name));
        let session_id = SessionId::generate(&prefix);
        let summary = SessionSummary::new(
            session_id.clone(),
            &scenario.container_id,
            scenario.profiler,
            scenario.memory_limit.as_str(),
        );
        Self {
            manager,
            hooks: scenario.setup.clone().unwrap_or_default(),
            container: scenario.container_id.clone(),
            scenario,
            settings,
            cancel,
            session_id,
            summary,
            invocation: None,
            original_limit: None,
            original_error: None,
            cleanup_error: None,
        }
    }

    /// Session id of this attempt.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Drive the session to a terminal status and write its summary.
    pub async fn run(mut self) -> SessionSummary {
        info!(
            session = %self.session_id,
            container = %self.container,
            profiler = %self.scenario.profiler,
            limit = %self.scenario.memory_limit,
            "profiling session started"
        );

        let mut machine = SessionMachine::new();
        let first = match self.resolve_target().await {
            Ok(()) => SessionEvent::TargetResolved,
            Err(e) => self.step_failed("resolve target", e),
        };
        let mut events = VecDeque::from([first]);

        while let Some(event) = events.pop_front() {
            let (next, actions) = machine.on_event(event);
            machine = next;
            self.summary.status = machine.status();
            for action in actions {
                let produced = self.perform(action).await;
                events.extend(produced);
            }
        }

        self.finish().await
    }

    async fn perform(&mut self, action: SessionAction) -> Vec<SessionEvent> {
        match action {
            SessionAction::RaiseMemory => {
                let r = self.raise_memory().await;
                self.settle("raise memory", r, |_| SessionEvent::MemoryRaised)
            }
            SessionAction::ResolveProcess => {
                let r = self.resolve_process().await;
                self.settle("resolve process", r, |pid| SessionEvent::ProcessVerified { pid })
            }
            SessionAction::KillProcesses => {
                let r = self
                    .guarded(self.manager.kill_managed_processes(&self.container, Signal::Term))
                    .await;
                self.settle("kill processes", r, |_| SessionEvent::ProcessesKilled)
            }
            SessionAction::StartProfiler => {
                let r = self.start_profiler().await;
                self.settle("start profiler", r, |pid| SessionEvent::ProfilerAttached { pid })
            }
            SessionAction::Hold => {
                self.hold().await;
                vec![SessionEvent::HoldStarted, SessionEvent::HoldFinished]
            }
            SessionAction::StopProfiler => {
                let r = self.stop_profiler().await;
                self.settle("stop profiler", r, |_| SessionEvent::ProfilerStopped)
            }
            SessionAction::CollectArtifact => {
                let r = self.collect().await;
                self.settle("collect artifact", r, |_| SessionEvent::ArtifactCollected)
            }
            SessionAction::Cleanup {
                restart_normally,
                restore_memory,
            } => self.cleanup(restart_normally, restore_memory).await,
            SessionAction::Finish(status) => {
                self.summary.status = status;
                vec![]
            }
        }
    }

    fn settle<T>(
        &mut self,
        step: &str,
        result: Result<T, RunnerError>,
        event: impl FnOnce(T) -> SessionEvent,
    ) -> Vec<SessionEvent> {
        match result {
            Ok(value) => vec![event(value)],
            Err(e) => vec![self.step_failed(step, e)],
        }
    }

    fn step_failed(&mut self, step: &str, e: RunnerError) -> SessionEvent {
        let message = format!("{}: {}", step, e);
        error!(session = %self.session_id, "{}", message);
        if self.summary.error_kind.is_none() {
            self.summary.error_kind = Some(e.kind());
        }
        self.summary.step_errors.push(message.clone());
        SessionEvent::StepFailed { error: message }
    }

    fn warn(&mut self, message: String) {
        warn!(session = %self.session_id, "{}", message);
        self.summary.warnings.push(message);
    }

    /// Run a device operation unless the session is cancelled first.
    async fn guarded<T>(
        &self,
        operation: impl Future<Output = Result<T, DeviceError>>,
    ) -> Result<T, RunnerError> {
        if self.cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RunnerError::Cancelled),
            r = operation => r.map_err(RunnerError::from),
        }
    }

    // =======================================================================
    // Steps
    // =======================================================================

    async fn resolve_target(&mut self) -> Result<(), RunnerError> {
        if self.container.is_empty() {
            let found = self
                .guarded(self.manager.find_target_container(&[]))
                .await?;
            info!(session = %self.session_id, container = %found.name, id = %found.id, "target discovered");
            self.container = if found.name.is_empty() {
                found.id
            } else {
                found.name
            };
        } else {
            self.guarded(self.manager.inspect_container(&self.container))
                .await?;
        }
        self.summary.container_id = self.container.clone();
        Ok(())
    }

    async fn raise_memory(&mut self) -> Result<(), RunnerError> {
        let original = self
            .guarded(self.manager.current_memory_limit(&self.container))
            .await;
        let original = match original {
            Ok(limit) => limit,
            Err(e) => {
                self.original_error =
                    Some((e.kind(), format!("original memory limit unknown: {}", e)));
                return Err(e);
            }
        };
        info!(session = %self.session_id, original = %original, "original memory limit recorded");
        self.summary.original_memory_limit = Some(original.to_string());
        self.original_limit = Some(original);

        let limit = self.scenario.memory_limit.clone();
        self.guarded(self.manager.set_memory_limit(&self.container, &limit))
            .await?;
        Ok(())
    }

    async fn resolve_process(&mut self) -> Result<u32, RunnerError> {
        let pid = match self.scenario.process_pid {
            Some(pid) => {
                let running = self
                    .guarded(self.manager.is_process_running(&self.container, pid))
                    .await?;
                if !running {
                    return Err(DeviceError::ProcessNotFound(format!(
                        "pid {} in {}",
                        pid, self.container
                    ))
                    .into());
                }
                pid
            }
            None => {
                let processes = self
                    .guarded(self.manager.find_managed_processes(&self.container))
                    .await?;
                let first = processes.first().ok_or_else(|| {
                    DeviceError::ProcessNotFound(format!(
                        "no managed process in {}",
                        self.container
                    ))
                })?;
                debug!(session = %self.session_id, pid = first.pid, command = %first.command, "using first managed process");
                first.pid
            }
        };
        self.summary.process_id = Some(pid);
        Ok(pid)
    }

    async fn start_profiler(&mut self) -> Result<u32, RunnerError> {
        let output_path =
            ProfilerInvocation::artifact_path(self.scenario.profiler, self.session_id.as_str());
        let invocation = ProfilerInvocation::new(
            self.scenario.profiler,
            &self.scenario.app_command,
            &output_path,
            self.scenario.profiler_options.as_deref(),
        );
        self.summary.container_output_file = Some(output_path.clone());
        self.invocation = Some(invocation.clone());

        let hooks = self.hooks.clone();
        let vars = template_vars(&hooks, &self.container, self.session_id.as_str(), &output_path);
        let staging = self.manager.session().host().working_dir.clone();
        let (pid, warnings) = {
            let runner = HookRunner::new(
                &self.manager,
                &self.container,
                &staging,
                self.session_id.as_str(),
                vars,
            );
            if self.cancel.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }
            runner.prepare(&hooks).await?;

            let pid = self
                .guarded(self.manager.start_under_profiler(&self.container, &invocation))
                .await?;
            self.summary.process_id = Some(pid);
            (pid, runner.after_start(&hooks).await)
        };
        for warning in warnings {
            self.warn(warning);
        }
        Ok(pid)
    }

    async fn hold(&mut self) {
        let duration = Duration::from_secs(self.scenario.duration_secs);
        let pid = self.summary.process_id;
        info!(session = %self.session_id, secs = duration.as_secs(), "holding under profiler");

        let load_stop = self.cancel.child_token();
        let load = match LoadPlan::for_scenario(self.manager.session().host(), &self.scenario) {
            Ok(Some(plan)) => Some(tokio::spawn(run_load(plan, load_stop.clone()))),
            Ok(None) => None,
            Err(e) => {
                self.warn(format!("load generator not started: {}", e));
                None
            }
        };

        let started = Instant::now();
        let deadline = started + duration;
        let mut profiler_alive = true;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = self.settings.poll_interval.min(deadline - now);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let held = started.elapsed().as_secs();
                    self.warn(format!("hold cancelled after {}s", held));
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self.manager.container_stats(&self.container).await {
                Ok(stats) => debug!(
                    session = %self.session_id,
                    usage = %stats.memory_usage,
                    limit = %stats.memory_limit,
                    percent = stats.memory_percent,
                    "container stats"
                ),
                Err(e) => debug!(session = %self.session_id, error = %e, "stats unavailable"),
            }
            if let (Some(pid), true) = (pid, profiler_alive) {
                if let Ok(false) = self.manager.is_process_running(&self.container, pid).await {
                    profiler_alive = false;
                    self.warn(format!("profiled process {} exited before the hold ended", pid));
                }
            }
        }

        load_stop.cancel();
        if let Some(handle) = load {
            match handle.await {
                Ok(report) => self.summary.load = Some(report),
                Err(e) => self.warn(format!("load generator task failed: {}", e)),
            }
        }
    }

    async fn stop_profiler(&mut self) -> Result<(), RunnerError> {
        let invocation = self.invocation()?;
        let signalled = self
            .manager
            .signal_profiler(&self.container, &invocation, Signal::Term)
            .await?;
        if !signalled {
            self.warn("profiler was not running when signalled".to_string());
        }
        debug!(session = %self.session_id, secs = self.settings.drain.as_secs(), "draining");
        tokio::time::sleep(self.settings.drain).await;
        self.manager
            .finalize_artifact(&self.container, &invocation)
            .await?;
        Ok(())
    }

    async fn collect(&mut self) -> Result<(), RunnerError> {
        let invocation = self.invocation()?;
        let name = self.scenario.profiler.artifact_name(self.session_id.as_str());
        let staging = format!(
            "{}/{}",
            self.manager
                .session()
                .host()
                .working_dir
                .trim_end_matches('/'),
            name
        );
        let local = self.scenario.output_dir.join(&name);
        self.manager
            .collect_artifact(&self.container, &invocation.output_path, &staging, &local)
            .await?;
        self.summary.local_output_file = Some(local);
        Ok(())
    }

    fn invocation(&self) -> Result<ProfilerInvocation, RunnerError> {
        self.invocation.clone().ok_or_else(|| {
            DeviceError::ProfilerNotStarted(self.container.clone()).into()
        })
    }

    // =======================================================================
    // Cleanup
    // =======================================================================

    /// Undo every change. Never observes cancellation.
    async fn cleanup(&mut self, restart_normally: bool, restore_memory: bool) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if !self.hooks.cleanup_commands.is_empty() && !self.container.is_empty() {
            let hooks = self.hooks.clone();
            let output = self.summary.container_output_file.clone().unwrap_or_default();
            let vars = template_vars(&hooks, &self.container, self.session_id.as_str(), &output);
            let staging = self.manager.session().host().working_dir.clone();
            let warnings = HookRunner::new(
                &self.manager,
                &self.container,
                &staging,
                self.session_id.as_str(),
                vars,
            )
            .cleanup(&hooks)
            .await;
            for warning in warnings {
                self.warn(warning);
            }
        }

        if restart_normally {
            match self
                .manager
                .stop_and_restore_normally(&self.container, &self.scenario.app_command)
                .await
            {
                Ok(()) => events.push(SessionEvent::RestartedNormally),
                Err(e) => {
                    self.cleanup_error.get_or_insert(e.kind());
                    self.warn(format!("normal restart failed: {}", e));
                    events.push(SessionEvent::StepFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        if restore_memory {
            self.summary.memory_restoration = self.restore_memory().await;
        }

        events.push(SessionEvent::CleanupFinished);
        events
    }

    async fn restore_memory(&mut self) -> RestorationOutcome {
        let target = self.original_limit.clone();
        if !self.scenario.restore_memory {
            info!(session = %self.session_id, "memory restoration skipped by configuration");
            return RestorationOutcome::skipped(target.map(|l| l.to_string()));
        }
        let Some(original) = target else {
            let (kind, reason) = self.original_error.clone().unwrap_or_else(|| {
                (ErrorKind::Command, "original memory limit unknown".to_string())
            });
            self.cleanup_error.get_or_insert(kind);
            self.warn(format!("memory not restored: {}", reason));
            return RestorationOutcome::failed(None, reason);
        };

        match self
            .manager
            .set_memory_limit(&self.container, &original)
            .await
        {
            Ok(_) => {
                info!(session = %self.session_id, limit = %original, "memory limit restored");
                RestorationOutcome::restored(original.to_string())
            }
            Err(e) => {
                self.cleanup_error.get_or_insert(e.kind());
                self.warn(format!("memory restoration to {} failed: {}", original, e));
                RestorationOutcome::failed(Some(original.to_string()), e.to_string())
            }
        }
    }

    async fn finish(mut self) -> SessionSummary {
        self.summary.end_time = Some(Utc::now());
        self.summary.error_kind = outcome_kind(&self.summary, self.cleanup_error);

        let path = summary_path(&self.scenario.output_dir, &self.session_id);
        if let Err(e) = write_summary(&path, &self.summary).await {
            warn!(session = %self.session_id, path = %path.display(), error = %e, "summary not written");
        }
        info!(
            session = %self.session_id,
            status = %self.summary.status,
            restored = self.summary.memory_restoration.succeeded,
            "profiling session finished"
        );
        self.summary
    }
}

/// Error kind reported for the finished session.
///
/// A failed session whose memory was put back is `Partial`; its step errors
/// keep the specifics. A completed session whose cleanup failed reports the
/// cleanup's own kind, with the warnings as its message.
fn outcome_kind(summary: &SessionSummary, cleanup_error: Option<ErrorKind>) -> Option<ErrorKind> {
    match summary.status {
        SessionStatus::Failed
            if summary.memory_restoration.attempted
                && summary.memory_restoration.succeeded
                && summary.error_kind != Some(ErrorKind::Cancelled) =>
        {
            Some(ErrorKind::Partial)
        }
        SessionStatus::Completed => summary.error_kind.or(cleanup_error),
        _ => summary.error_kind,
    }
}

async fn write_summary(path: &Path, summary: &SessionSummary) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(summary)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_device::{FakeContainer, FakeDockerHost, ManagerConfig, RemoteSession};
    use probe_types::{ProfilerKind, RemoteHost};
    use std::sync::Arc;

    const APP: &str = "/usr/bin/netconfd --foreground";
    const GIB: u64 = 1 << 30;

    fn netconf_ui() -> FakeContainer {
        FakeContainer::new("4f2a9c1d", "netconf-ui", "vendor/netconf-ui:2.1")
            .with_memory_limit("2GB")
            .with_process(APP)
    }

    async fn manager(fake: &FakeDockerHost) -> ContainerManager {
        let mut session = RemoteSession::new(
            RemoteHost::new("fake-device", "admin"),
            Arc::new(fake.clone()),
        );
        session.connect().await.unwrap();
        ContainerManager::new(Arc::new(session), ManagerConfig::default())
    }

    fn scenario(out: &Path) -> TestScenario {
        let mut s = TestScenario::new(
            "ui-valgrind",
            "netconf-ui",
            MemoryLimit::parse("5g").unwrap(),
            out.to_path_buf(),
        );
        s.duration_secs = 60;
        s
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            drain: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
        }
    }

    // ===========================================
    // Happy path
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn valgrind_session_completes_and_restores() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        let session = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        );
        let id = session.session_id().clone();
        let summary = session.run().await;

        assert_eq!(summary.status, SessionStatus::Completed, "{:?}", summary.step_errors);
        assert!(summary.step_errors.is_empty());
        assert_eq!(summary.error_kind, None);
        assert!(id.as_str().starts_with("router-1_ui-valgrind_"));

        let artifact = out.path().join(format!("{}_valgrind.xml", id));
        assert_eq!(summary.local_output_file.as_deref(), Some(artifact.as_path()));
        let report = std::fs::read_to_string(&artifact).unwrap();
        assert!(report.contains("<valgrindoutput>"));

        // Raise to 5g, then back to the original 2GB.
        let updates: Vec<String> = fake
            .docker_calls()
            .into_iter()
            .filter(|c| c.starts_with("docker update"))
            .collect();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].contains("--memory 5g"));
        assert_eq!(fake.memory_limit("netconf-ui"), Some(2 * GIB));
        assert!(summary.memory_restoration.succeeded);
        assert_eq!(summary.original_memory_limit.as_deref(), Some("2GiB"));

        // The application runs normally again, without valgrind.
        let processes = fake.processes("netconf-ui");
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].1, APP);

        // Summary on disk matches.
        let json = std::fs::read_to_string(summary_path(out.path(), &id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["profiler"], "valgrind");
        assert_eq!(value["new_memory_limit"], "5g");
        assert_eq!(value["memory_restoration"]["target_limit"], "2GiB");
    }

    #[tokio::test(start_paused = true)]
    async fn manager_calls_follow_the_session_order() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        )
        .run()
        .await;

        let calls = fake.docker_calls();
        let position = |needle: &str| {
            calls
                .iter()
                .position(|c| c.contains(needle))
                .unwrap_or_else(|| panic!("{} not issued: {:#?}", needle, calls))
        };
        let raise = position("--memory 5g");
        let term = position("kill -TERM");
        let start = position("exec -d");
        let copy = position("docker cp netconf-ui:");
        let restore = calls
            .iter()
            .rposition(|c| c.starts_with("docker update"))
            .unwrap();
        assert!(raise < term && term < start && start < copy && copy < restore);
    }

    #[tokio::test(start_paused = true)]
    async fn asan_session_collects_log() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        let mut s = scenario(out.path());
        s.profiler = ProfilerKind::Asan;
        s.duration_secs = 5;
        let summary = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            s,
            settings(),
            CancellationToken::new(),
        )
        .run()
        .await;

        assert_eq!(summary.status, SessionStatus::Completed, "{:?}", summary.step_errors);
        let local = summary.local_output_file.unwrap();
        assert_eq!(local.extension().unwrap(), "log");
        let log = std::fs::read_to_string(local).unwrap();
        assert!(log.contains("LeakSanitizer"));
    }

    // ===========================================
    // Restoration on failure
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn missing_profiler_fails_but_restores_memory() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui().without_binary("valgrind"));
        let summary = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        )
        .run()
        .await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert_eq!(summary.error_kind, Some(ErrorKind::Partial));
        assert!(summary.step_errors[0].contains("valgrind"), "{:?}", summary.step_errors);
        assert!(summary.memory_restoration.attempted);
        assert!(summary.memory_restoration.succeeded);
        assert_eq!(fake.memory_limit("netconf-ui"), Some(2 * GIB));
        assert_eq!(fake.count_docker("docker update"), 2);
        // The application was killed, so it is started again.
        assert_eq!(fake.processes("netconf-ui").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unverified_raise_is_still_restored_once() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new()
            .with_container(netconf_ui())
            .ignore_memory_updates();
        let summary = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        )
        .run()
        .await;

        assert_eq!(summary.status, SessionStatus::Failed);
        // The limit never moved, so putting it back verifies.
        assert_eq!(summary.error_kind, Some(ErrorKind::Partial));
        assert_eq!(fake.count_docker("docker update"), 2);
        assert!(summary.memory_restoration.attempted);
        assert!(summary.memory_restoration.succeeded);
        // Nothing was killed, so nothing is restarted.
        assert_eq!(fake.count_docker("exec -d"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_original_limit_is_recorded_as_failed_restoration() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        fake.respond(
            "docker stats",
            probe_device::CommandOutput::failed(1, "cgroup stats unavailable"),
        );
        let session = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        );
        let id = session.session_id().clone();
        let summary = session.run().await;

        assert_eq!(summary.status, SessionStatus::Failed);
        // Nothing was put back, so this is not a partial success.
        assert_eq!(summary.error_kind, Some(ErrorKind::Command));
        assert_eq!(fake.count_docker("docker update"), 0);
        assert_eq!(fake.memory_limit("netconf-ui"), Some(2 * GIB));

        let restoration = &summary.memory_restoration;
        assert!(restoration.attempted);
        assert!(!restoration.succeeded);
        assert_eq!(restoration.target_limit, None);
        assert!(restoration
            .error
            .as_deref()
            .unwrap()
            .starts_with("original memory limit unknown"));
        assert!(summary.warnings.iter().any(|w| w.starts_with("memory not restored")));

        let json = std::fs::read_to_string(summary_path(out.path(), &id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["error_kind"], "command");
        assert_eq!(value["original_memory_limit"], serde_json::Value::Null);
        assert_eq!(value["memory_restoration"]["attempted"], true);
        assert_eq!(value["memory_restoration"]["succeeded"], false);
        assert_eq!(value["memory_restoration"]["target_limit"], serde_json::Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_step_with_failed_restore_keeps_the_step_kind() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui().without_binary("valgrind"));
        fake.respond(
            "--memory 2GiB",
            probe_device::CommandOutput::failed(1, "Error response from daemon: cannot update"),
        );
        let session = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        );
        let id = session.session_id().clone();
        let summary = session.run().await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert_eq!(summary.error_kind, Some(ErrorKind::ProfilerUnavailable));
        assert_eq!(fake.memory_limit("netconf-ui"), Some(5 * GIB));

        let restoration = &summary.memory_restoration;
        assert!(restoration.attempted);
        assert!(!restoration.succeeded);
        assert_eq!(restoration.target_limit.as_deref(), Some("2GiB"));
        assert!(restoration.error.as_deref().unwrap().contains("cannot update"));
        assert!(summary
            .warnings
            .iter()
            .any(|w| w.starts_with("memory restoration to 2GiB failed")));

        let json = std::fs::read_to_string(summary_path(out.path(), &id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["error_kind"], "profiler_unavailable");
        assert_eq!(value["memory_restoration"]["succeeded"], false);
        assert_eq!(value["memory_restoration"]["target_limit"], "2GiB");
    }

    #[tokio::test(start_paused = true)]
    async fn completed_session_with_failed_restore_reports_the_restore_kind() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        fake.respond(
            "--memory 2GiB",
            probe_device::CommandOutput::failed(1, "Error response from daemon: cannot update"),
        );
        let session = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        );
        let id = session.session_id().clone();
        let summary = session.run().await;

        assert_eq!(summary.status, SessionStatus::Completed, "{:?}", summary.step_errors);
        assert!(summary.step_errors.is_empty());
        assert_eq!(summary.error_kind, Some(ErrorKind::Command));
        assert!(summary.local_output_file.is_some());
        assert!(!summary.memory_restoration.succeeded);
        assert_eq!(fake.memory_limit("netconf-ui"), Some(5 * GIB));

        let json = std::fs::read_to_string(summary_path(out.path(), &id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["error_kind"], "command");
        assert_eq!(value["memory_restoration"]["attempted"], true);
        assert_eq!(value["memory_restoration"]["succeeded"], false);
    }

    #[test]
    fn partial_needs_a_failed_session_with_memory_restored() {
        let mut summary = SessionSummary::new(
            SessionId::generate("s"),
            "netconf-ui",
            ProfilerKind::Valgrind,
            "5g",
        );
        summary.status = SessionStatus::Failed;
        summary.error_kind = Some(ErrorKind::NotFound);
        assert_eq!(outcome_kind(&summary, None), Some(ErrorKind::NotFound));

        summary.memory_restoration = RestorationOutcome::restored("2GiB".into());
        assert_eq!(outcome_kind(&summary, None), Some(ErrorKind::Partial));

        summary.error_kind = Some(ErrorKind::Cancelled);
        assert_eq!(outcome_kind(&summary, None), Some(ErrorKind::Cancelled));

        summary.memory_restoration = RestorationOutcome::skipped(Some("2GiB".into()));
        summary.error_kind = Some(ErrorKind::Escalation);
        assert_eq!(outcome_kind(&summary, None), Some(ErrorKind::Escalation));

        summary.status = SessionStatus::Completed;
        summary.error_kind = None;
        assert_eq!(outcome_kind(&summary, None), None);
        assert_eq!(
            outcome_kind(&summary, Some(ErrorKind::Connection)),
            Some(ErrorKind::Connection)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn opt_out_skips_restoration() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        let mut s = scenario(out.path());
        s.restore_memory = false;
        s.duration_secs = 1;
        let summary = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            s,
            settings(),
            CancellationToken::new(),
        )
        .run()
        .await;

        assert_eq!(summary.status, SessionStatus::Completed);
        assert!(summary.memory_restoration.skipped);
        assert!(!summary.memory_restoration.attempted);
        assert_eq!(fake.memory_limit("netconf-ui"), Some(5 * GIB));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_container_touches_nothing() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        let mut s = scenario(out.path());
        s.container_id = "missing".into();
        let summary = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            s,
            settings(),
            CancellationToken::new(),
        )
        .run()
        .await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert_eq!(summary.memory_restoration, RestorationOutcome::not_needed());
        assert_eq!(fake.count_docker("docker update"), 0);
        assert_eq!(summary.step_errors.len(), 1);
    }

    // ===========================================
    // Hold behaviour
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_fails_without_changes() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            cancel,
        )
        .run()
        .await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert_eq!(summary.error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(fake.count_docker("docker update"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_hold_still_collects_and_restores() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        let cancel = CancellationToken::new();
        let mut s = scenario(out.path());
        s.duration_secs = 3600;
        let session = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            s,
            settings(),
            cancel.clone(),
        );
        let handle = tokio::spawn(session.run());
        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.status, SessionStatus::Completed);
        assert!(summary.warnings.iter().any(|w| w.starts_with("hold cancelled")));
        assert_eq!(fake.memory_limit("netconf-ui"), Some(2 * GIB));
    }

    #[tokio::test(start_paused = true)]
    async fn early_profiler_exit_is_a_warning() {
        let out = tempfile::tempdir().unwrap();
        let fake = FakeDockerHost::new().with_container(netconf_ui());
        // Every liveness check reports the process gone.
        fake.respond("ps -p", probe_device::CommandOutput::failed(1, ""));
        let summary = ProfilingSession::new(
            manager(&fake).await,
            "router-1",
            scenario(out.path()),
            settings(),
            CancellationToken::new(),
        )
        .run()
        .await;

        assert_eq!(summary.status, SessionStatus::Completed, "{:?}", summary.step_errors);
        let exits: Vec<_> = summary
            .warnings
            .iter()
            .filter(|w| w.contains("exited before the hold ended"))
            .collect();
        assert_eq!(exits.len(), 1);
    }
}
