//! Multi-device test orchestrator.
//!
//! Devices run in a bounded pool; each device runs its scenarios in a second
//! bounded pool. Every scenario opens its own remote session. Results travel
//! over a channel and are only aggregated after every worker has joined, so
//! completion order never matters. A failing or panicking scenario becomes a
//! `FAILED` result and never cancels its siblings.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures_util::FutureExt;
use probe_device::{ContainerManager, RemoteSession, ShellFactory};
use probe_types::{
    Container, DeviceSpec, ErrorKind, ManagedProcess, ResultStatus, SessionStatus, TestResult,
    TestScenario,
};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{
    mpsc, Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, Semaphore,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalysisSink, NoopAnalysis};
use crate::config::{Config, ManagerSettings};
use crate::error::RunnerError;
use crate::profiling::{summary_path, ProfilingSession, SessionSettings};
use crate::report::{ConsolidatedReport, RunInfo};

/// Executes one scenario and always produces a result.
#[async_trait]
pub trait ScenarioRunner: Send + Sync {
    /// Run `scenario` of `device`.
    async fn run_scenario(
        &self,
        device: &DeviceSpec,
        scenario: &TestScenario,
        cancel: CancellationToken,
    ) -> TestResult;
}

/// Runs scenarios as profiling sessions over shells from a [`ShellFactory`].
pub struct DeviceScenarioRunner {
    factory: Arc<dyn ShellFactory>,
    settings: ManagerSettings,
}

impl DeviceScenarioRunner {
    /// Runner opening shells through `factory`.
    pub fn new(factory: Arc<dyn ShellFactory>, settings: ManagerSettings) -> Self {
        Self { factory, settings }
    }
}

/// Open and connect a session to `device`, giving up when `cancel` fires.
async fn connect(
    factory: &dyn ShellFactory,
    device: &DeviceSpec,
    settings: &ManagerSettings,
    cancel: &CancellationToken,
) -> Result<RemoteSession, RunnerError> {
    let host = device.connection.clone();
    let shell = factory.shell_for(&host);
    let mut session = RemoteSession::new(host, shell)
        .with_default_timeout(settings.manager_config().command_timeout);
    let connected = tokio::select! {
        _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        r = session.connect() => r.map_err(RunnerError::from),
    };
    connected?;
    Ok(session)
}

#[async_trait]
impl ScenarioRunner for DeviceScenarioRunner {
    async fn run_scenario(
        &self,
        device: &DeviceSpec,
        scenario: &TestScenario,
        cancel: CancellationToken,
    ) -> TestResult {
        let start_time = Utc::now();
        if cancel.is_cancelled() {
            return TestResult::failed(
                &device.name,
                &scenario.name,
                start_time,
                ErrorKind::Cancelled,
                "cancelled before start",
            );
        }

        let session = match connect(self.factory.as_ref(), device, &self.settings, &cancel).await
        {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!(device = %device.name, scenario = %scenario.name, error = %e, "cannot open session");
                return TestResult::failed(
                    &device.name,
                    &scenario.name,
                    start_time,
                    e.kind(),
                    e.to_string(),
                );
            }
        };

        let manager = ContainerManager::new(Arc::clone(&session), self.settings.manager_config());
        let profiling = ProfilingSession::new(
            manager,
            &device.name,
            scenario.clone(),
            SessionSettings::from(&self.settings),
            cancel,
        );
        let session_id = profiling.session_id().clone();
        let summary = profiling.run().await;

        if let Ok(mut session) = Arc::try_unwrap(session) {
            session.disconnect().await;
        }

        let completed = summary.status == SessionStatus::Completed;
        let mut output_files: Vec<PathBuf> = summary.local_output_file.iter().cloned().collect();
        output_files.push(summary_path(&scenario.output_dir, &session_id));

        let error_message = if summary.step_errors.is_empty() {
            summary.error_kind.map(|_| summary.warnings.join("; "))
        } else {
            Some(summary.step_errors.join("; "))
        };

        TestResult {
            device_name: device.name.clone(),
            scenario_name: scenario.name.clone(),
            status: if completed {
                ResultStatus::Completed
            } else {
                ResultStatus::Failed
            },
            start_time,
            end_time: Utc::now(),
            error_message,
            error_kind: summary.error_kind,
            session_summary: Some(summary),
            output_files,
        }
    }
}

/// Which part of the configuration to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    /// Only this device.
    pub device: Option<String>,
    /// Only this scenario.
    pub scenario: Option<String>,
}

/// One line of a dry-run plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedScenario {
    /// Device name.
    pub device: String,
    /// Device hostname.
    pub hostname: String,
    /// Scenario to run.
    pub scenario: TestScenario,
}

/// What `discover` found on one device.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Device name.
    pub device: String,
    /// Target container, when one was found.
    pub container: Option<Container>,
    /// Managed processes in the target container.
    pub processes: Vec<ManagedProcess>,
    /// Why discovery failed.
    pub error: Option<String>,
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Consolidated report.
    pub report: ConsolidatedReport,
    /// Where it was written. `None` when disabled or when writing failed.
    pub report_path: Option<PathBuf>,
}

/// Keeps scenarios that share a container from overlapping.
///
/// A scenario naming its container holds the device lock shared and that
/// container's lock exclusively. An auto-discovered scenario cannot know its
/// target up front, so it holds the device lock exclusively.
///
/// Containers are keyed by the literal `container_id` string. A container
/// named by its id in one scenario and by its name in another gets two keys,
/// so those scenarios are not kept apart.
#[derive(Default)]
struct ContainerLocks {
    devices: DashMap<String, Arc<RwLock<()>>>,
    containers: DashMap<(String, String), Arc<Mutex<()>>>,
}

enum ContainerGuard {
    Device {
        _exclusive: OwnedRwLockWriteGuard<()>,
    },
    Container {
        _shared: OwnedRwLockReadGuard<()>,
        _container: OwnedMutexGuard<()>,
    },
}

impl ContainerLocks {
    async fn acquire(&self, device: &str, container: &str) -> ContainerGuard {
        let device_lock = Arc::clone(self.devices.entry(device.to_string()).or_default().value());
        if container.is_empty() {
            return ContainerGuard::Device {
                _exclusive: device_lock.write_owned().await,
            };
        }
        let shared = device_lock.read_owned().await;
        let key = (device.to_string(), container.to_string());
        let container_lock = Arc::clone(self.containers.entry(key).or_default().value());
        ContainerGuard::Container {
            _shared: shared,
            _container: container_lock.lock_owned().await,
        }
    }
}

/// Runs every scenario of every selected device.
pub struct Orchestrator {
    config: Config,
    factory: Arc<dyn ShellFactory>,
    runner: Arc<dyn ScenarioRunner>,
    analysis: Arc<dyn AnalysisSink>,
    config_file: Option<PathBuf>,
}

impl Orchestrator {
    /// Orchestrator opening shells through `factory`.
    pub fn new(config: Config, factory: Arc<dyn ShellFactory>) -> Self {
        let runner = Arc::new(DeviceScenarioRunner::new(
            Arc::clone(&factory),
            config.manager.clone(),
        ));
        Self {
            config,
            factory,
            runner,
            analysis: Arc::new(NoopAnalysis),
            config_file: None,
        }
    }

    /// Replace the scenario runner.
    pub fn with_runner(mut self, runner: Arc<dyn ScenarioRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Hand collected artifacts to `sink` after the run.
    pub fn with_analysis(mut self, sink: Arc<dyn AnalysisSink>) -> Self {
        self.analysis = sink;
        self
    }

    /// Record the configuration file in the report.
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    /// The configuration being run.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Devices and scenarios selected by `filter`.
    pub fn select(&self, filter: &RunFilter) -> Result<Vec<DeviceSpec>, RunnerError> {
        let mut devices: Vec<DeviceSpec> = self
            .config
            .devices
            .iter()
            .filter(|d| filter.device.as_deref().map_or(true, |n| d.name == n))
            .cloned()
            .collect();
        if let Some(name) = &filter.device {
            if devices.is_empty() {
                return Err(RunnerError::NotFound {
                    what: "device",
                    name: name.clone(),
                });
            }
        }
        if let Some(name) = &filter.scenario {
            for device in &mut devices {
                device.scenarios.retain(|s| &s.name == name);
            }
            devices.retain(|d| !d.scenarios.is_empty());
            if devices.is_empty() {
                return Err(RunnerError::NotFound {
                    what: "scenario",
                    name: name.clone(),
                });
            }
        }
        Ok(devices)
    }

    /// What a run with `filter` would do, without connecting anywhere.
    pub fn plan(&self, filter: &RunFilter) -> Result<Vec<PlannedScenario>, RunnerError> {
        Ok(self
            .select(filter)?
            .into_iter()
            .flat_map(|device| {
                let hostname = device.connection.hostname.clone();
                let name = device.name.clone();
                device.scenarios.into_iter().map(move |scenario| PlannedScenario {
                    device: name.clone(),
                    hostname: hostname.clone(),
                    scenario,
                })
            })
            .collect())
    }

    /// Run the selected scenarios and write the consolidated report.
    ///
    /// Errors only when the selection fails. A report that cannot be written
    /// is logged and leaves `report_path` empty.
    pub async fn run(
        &self,
        filter: &RunFilter,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        let devices = self.select(filter)?;
        let total_tests: usize = devices.iter().map(|d| d.scenarios.len()).sum();
        let started = Utc::now();
        info!(devices = devices.len(), scenarios = total_tests, "test run started");

        let mut results = self.execute(&devices, cancel).await;
        results.sort_by(|a, b| {
            (&a.device_name, &a.scenario_name, a.start_time)
                .cmp(&(&b.device_name, &b.scenario_name, b.start_time))
        });

        self.analyze(&results).await;

        let info = RunInfo {
            timestamp: Utc::now(),
            config_file: self.config_file.clone(),
            total_devices: devices.len(),
            total_tests,
            started,
            finished: Utc::now(),
        };
        let report = ConsolidatedReport::new(info, results);
        let overall = &report.summary.overall;
        info!(
            total = overall.total,
            successful = overall.successful,
            failed = overall.failed,
            rate = %overall.success_rate,
            "test run finished"
        );

        let report_path = if self.config.global.consolidated_report {
            match report.write_to(&self.config.global.report_dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    error!(
                        dir = %self.config.global.report_dir.display(),
                        error = %e,
                        "consolidated report not written"
                    );
                    None
                }
            }
        } else {
            None
        };
        Ok(RunOutcome {
            report,
            report_path,
        })
    }

    async fn execute(&self, devices: &[DeviceSpec], cancel: CancellationToken) -> Vec<TestResult> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let device_slots = Arc::new(Semaphore::new(self.config.global.max_parallel_devices));
        let scenario_bound = self.config.global.max_parallel_scenarios_per_device;
        let locks = Arc::new(ContainerLocks::default());

        let mut workers = JoinSet::new();
        for device in devices.iter().cloned() {
            let slots = Arc::clone(&device_slots);
            let runner = Arc::clone(&self.runner);
            let locks = Arc::clone(&locks);
            let tx = tx.clone();
            let cancel = cancel.child_token();
            workers.spawn(async move {
                let _slot = slots.acquire_owned().await.ok();
                info!(device = %device.name, scenarios = device.scenarios.len(), "device started");
                run_device(device, scenario_bound, runner, locks, tx, cancel).await;
            });
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "device worker aborted");
            }
        }

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    async fn analyze(&self, results: &[TestResult]) {
        for result in results.iter().filter(|r| r.is_success()) {
            let artifact = result
                .session_summary
                .as_ref()
                .and_then(|s| s.local_output_file.as_ref());
            if let Some(artifact) = artifact {
                if let Err(e) = self.analysis.analyze(result, artifact).await {
                    warn!(
                        device = %result.device_name,
                        scenario = %result.scenario_name,
                        error = %e,
                        "analysis failed"
                    );
                }
            }
        }
    }

    /// Find the target container and its managed processes on each device.
    pub async fn discover(
        &self,
        device: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Vec<Discovery>, RunnerError> {
        let filter = RunFilter {
            device: device.map(String::from),
            scenario: None,
        };
        let mut found = Vec::new();
        for spec in self.select(&filter)? {
            found.push(self.discover_device(&spec, &cancel).await);
        }
        Ok(found)
    }

    async fn discover_device(&self, spec: &DeviceSpec, cancel: &CancellationToken) -> Discovery {
        let mut discovery = Discovery {
            device: spec.name.clone(),
            container: None,
            processes: Vec::new(),
            error: None,
        };
        let session =
            match connect(self.factory.as_ref(), spec, &self.config.manager, cancel).await {
                Ok(session) => Arc::new(session),
                Err(e) => {
                    discovery.error = Some(e.to_string());
                    return discovery;
                }
            };
        let manager = ContainerManager::new(session, self.config.manager.manager_config());

        let preferred: Vec<String> = spec
            .scenarios
            .iter()
            .map(|s| s.container_id.clone())
            .filter(|c| !c.is_empty())
            .collect();
        match manager.find_target_container(&preferred).await {
            Ok(container) => {
                let reference = if container.name.is_empty() {
                    container.id.clone()
                } else {
                    container.name.clone()
                };
                match manager.find_managed_processes(&reference).await {
                    Ok(processes) => discovery.processes = processes,
                    Err(e) => discovery.error = Some(e.to_string()),
                }
                discovery.container = Some(container);
            }
            Err(e) => discovery.error = Some(e.to_string()),
        }
        discovery
    }

    /// Connect to one device and gather system information.
    pub async fn check(
        &self,
        device: &str,
        cancel: CancellationToken,
    ) -> Result<BTreeMap<String, String>, RunnerError> {
        let filter = RunFilter {
            device: Some(device.to_string()),
            scenario: None,
        };
        let spec = self
            .select(&filter)?
            .into_iter()
            .next()
            .ok_or_else(|| RunnerError::NotFound {
                what: "device",
                name: device.to_string(),
            })?;
        let mut session = connect(self.factory.as_ref(), &spec, &self.config.manager, &cancel).await?;
        let info = session.system_info().await;
        session.disconnect().await;
        Ok(info?)
    }
}

async fn run_device(
    device: DeviceSpec,
    scenario_bound: usize,
    runner: Arc<dyn ScenarioRunner>,
    locks: Arc<ContainerLocks>,
    tx: mpsc::UnboundedSender<TestResult>,
    cancel: CancellationToken,
) {
    let slots = Arc::new(Semaphore::new(scenario_bound));
    let device = Arc::new(device);
    let mut scenarios = JoinSet::new();

    for scenario in device.scenarios.iter().cloned() {
        let slots = Arc::clone(&slots);
        let runner = Arc::clone(&runner);
        let locks = Arc::clone(&locks);
        let device = Arc::clone(&device);
        let tx = tx.clone();
        let cancel = cancel.clone();
        scenarios.spawn(async move {
            // Lock first: a scenario queued behind its container must not
            // hold a slot other containers could use.
            let _guard = locks.acquire(&device.name, &scenario.container_id).await;
            let _slot = slots.acquire_owned().await.ok();

            let start_time = Utc::now();
            info!(device = %device.name, scenario = %scenario.name, "scenario started");
            let result = AssertUnwindSafe(runner.run_scenario(&device, &scenario, cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(device = %device.name, scenario = %scenario.name, %message, "scenario panicked");
                    let e = RunnerError::Panicked(message);
                    TestResult::failed(&device.name, &scenario.name, start_time, e.kind(), e.to_string())
                });
            info!(
                device = %device.name,
                scenario = %scenario.name,
                status = ?result.status,
                "scenario finished"
            );
            if tx.send(result).is_err() {
                debug!("result receiver dropped");
            }
        });
    }

    while let Some(joined) = scenarios.join_next().await {
        if let Err(e) = joined {
            error!(device = %device.name, error = %e, "scenario worker aborted");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_types::{MemoryLimit, RemoteHost};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn device(name: &str, scenarios: &[&str]) -> DeviceSpec {
        DeviceSpec {
            name: name.to_string(),
            connection: RemoteHost::new(&format!("{}.lab", name), "admin"),
            scenarios: scenarios
                .iter()
                .map(|s| {
                    TestScenario::new(
                        s,
                        &format!("{}-container", s),
                        MemoryLimit::parse("5g").unwrap(),
                        PathBuf::from("out"),
                    )
                })
                .collect(),
        }
    }

    fn config(devices: Vec<DeviceSpec>, report_dir: PathBuf) -> Config {
        let mut config: Config = toml::from_str("").unwrap();
        config.devices = devices;
        config.global.report_dir = report_dir;
        config
    }

    /// Completes everything except one scenario, which panics.
    struct Scripted {
        panic_on: (String, String),
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Scripted {
        fn new(device: &str, scenario: &str) -> Self {
            Self {
                panic_on: (device.to_string(), scenario.to_string()),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ScenarioRunner for Scripted {
        async fn run_scenario(
            &self,
            device: &DeviceSpec,
            scenario: &TestScenario,
            _cancel: CancellationToken,
        ) -> TestResult {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if (device.name.clone(), scenario.name.clone()) == self.panic_on {
                panic!("simulated crash in {}", scenario.name);
            }
            let mut result = TestResult::failed(&device.name, &scenario.name, Utc::now(), ErrorKind::Io, "");
            result.status = ResultStatus::Completed;
            result.error_message = None;
            result.error_kind = None;
            result
        }
    }

    /// Panics if two scenarios ever hold the same container at once.
    #[derive(Default)]
    struct Exclusive {
        busy: std::sync::Mutex<std::collections::HashSet<String>>,
    }

    #[async_trait]
    impl ScenarioRunner for Exclusive {
        async fn run_scenario(
            &self,
            device: &DeviceSpec,
            scenario: &TestScenario,
            _cancel: CancellationToken,
        ) -> TestResult {
            let key = format!("{}/{}", device.name, scenario.container_id);
            {
                let mut busy = self.busy.lock().unwrap();
                let auto = format!("{}/", device.name);
                if scenario.container_id.is_empty() {
                    assert!(!busy.iter().any(|k| k.starts_with(&auto)), "{} busy", device.name);
                } else {
                    assert!(!busy.contains(&auto), "{} held by discovery", device.name);
                }
                assert!(busy.insert(key.clone()), "{} in use", key);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.busy.lock().unwrap().remove(&key);
            let mut result = TestResult::failed(&device.name, &scenario.name, Utc::now(), ErrorKind::Io, "");
            result.status = ResultStatus::Completed;
            result
        }
    }

    fn orchestrator(config: Config, runner: Arc<dyn ScenarioRunner>) -> Orchestrator {
        Orchestrator::new(config, Arc::new(probe_device::SshShellFactory)).with_runner(runner)
    }

    // ===========================================
    // Isolation
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn panicking_scenario_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let devices = vec![
            device("dev1", &["a", "b"]),
            device("dev2", &["a", "b"]),
            device("dev3", &["a", "b"]),
        ];
        let orch = orchestrator(
            config(devices, dir.path().to_path_buf()),
            Arc::new(Scripted::new("dev2", "a")),
        );

        let outcome = orch
            .run(&RunFilter::default(), CancellationToken::new())
            .await
            .unwrap();
        let results = &outcome.report.results;
        assert_eq!(results.len(), 6);

        let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].device_name, "dev2");
        assert_eq!(failed[0].scenario_name, "a");
        let message = failed[0].error_message.as_deref().unwrap();
        assert!(message.contains("simulated crash in a"), "{}", message);

        let summary = &outcome.report.summary;
        assert_eq!(summary.overall.successful, 5);
        assert_eq!(summary.by_device["dev2"].failed, 1);
        assert!(outcome.report_path.unwrap().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let devices = (1..=4)
            .map(|i| device(&format!("dev{}", i), &["a", "b", "c"]))
            .collect();
        let mut config = config(devices, dir.path().to_path_buf());
        config.global.max_parallel_devices = 2;
        config.global.max_parallel_scenarios_per_device = 2;
        config.global.consolidated_report = false;
        let runner = Arc::new(Scripted::new("none", "none"));
        let orch = orchestrator(config, runner.clone());

        let outcome = orch
            .run(&RunFilter::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.report.results.len(), 12);
        assert!(outcome.report_path.is_none());
        assert_eq!(runner.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn same_container_scenarios_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device("dev1", &["a", "b", "c"]);
        for scenario in &mut dev.scenarios {
            scenario.container_id = "netconf-ui".into();
        }
        let mut config = config(vec![dev], dir.path().to_path_buf());
        config.global.max_parallel_scenarios_per_device = 3;

        let orch = orchestrator(config, Arc::new(Exclusive::default()));
        let outcome = orch
            .run(&RunFilter::default(), CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.report.results.iter().all(|r| r.is_success()));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_a_container_does_not_take_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device("dev1", &["a", "b", "c", "d"]);
        dev.scenarios[0].container_id = "netconf-ui".into();
        dev.scenarios[1].container_id = "netconf-ui".into();
        let mut config = config(vec![dev], dir.path().to_path_buf());
        config.global.max_parallel_scenarios_per_device = 2;
        config.global.consolidated_report = false;
        let runner = Arc::new(Scripted::new("none", "none"));
        let orch = orchestrator(config, runner.clone());

        let start = tokio::time::Instant::now();
        let outcome = orch
            .run(&RunFilter::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.report.results.len(), 4);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 2);
        // a with c, then b with d. Had b parked on a slot, d would need a third wave.
        assert!(start.elapsed() < Duration::from_millis(150), "{:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_discovered_scenarios_hold_the_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device("dev1", &["a", "b", "c", "d"]);
        dev.scenarios[0].container_id = "netconf-ui".into();
        dev.scenarios[1].container_id = String::new();
        dev.scenarios[2].container_id = "netconf-ui".into();
        let mut config = config(vec![dev, device("dev2", &["a"])], dir.path().to_path_buf());
        config.global.max_parallel_scenarios_per_device = 4;

        let orch = orchestrator(config, Arc::new(Exclusive::default()));
        let outcome = orch
            .run(&RunFilter::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.report.results.len(), 5);
        assert!(outcome.report.results.iter().all(|r| r.is_success()));
    }

    // ===========================================
    // Selection
    // ===========================================

    #[test]
    fn filters_select_devices_and_scenarios() {
        let config = config(
            vec![device("dev1", &["a", "b"]), device("dev2", &["a"])],
            PathBuf::from("reports"),
        );
        let orch = orchestrator(config, Arc::new(Scripted::new("x", "y")));

        let plan = orch.plan(&RunFilter::default()).unwrap();
        assert_eq!(plan.len(), 3);

        let only = RunFilter {
            device: Some("dev1".into()),
            scenario: Some("b".into()),
        };
        let plan = orch.plan(&only).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].hostname, "dev1.lab");
        assert_eq!(plan[0].scenario.name, "b");

        let missing = RunFilter {
            device: Some("dev9".into()),
            scenario: None,
        };
        assert!(matches!(
            orch.plan(&missing),
            Err(RunnerError::NotFound { what: "device", .. })
        ));
        let missing = RunFilter {
            device: Some("dev2".into()),
            scenario: Some("b".into()),
        };
        assert!(matches!(
            orch.plan(&missing),
            Err(RunnerError::NotFound { what: "scenario", .. })
        ));
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
