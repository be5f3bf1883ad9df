//! Profiling state machines.
//!
//! Two machines, both pure:
//!
//! - [`ProfiledRun`] tracks what has been done to one container
//!   (`Idle → MemoryRaised → ProcessesKilled → ProfilerRunning →
//!   ProfilerStopped → ArtifactCopied → NormalRestart`), so cleanup knows
//!   what to undo.
//! - [`SessionMachine`] sequences a whole profiling session. It takes the
//!   outcome of each step as an event and returns the next actions; the
//!   runner performs the I/O.
//!
//! Every failure path ends in exactly one [`SessionAction::Cleanup`].

use probe_types::SessionStatus;
use thiserror::Error;

/// State of one profiled run inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Nothing changed yet.
    Idle,
    /// Memory limit raised.
    MemoryRaised,
    /// Managed processes killed.
    ProcessesKilled,
    /// Application running under the profiler.
    ProfilerRunning,
    /// Profiler stopped.
    ProfilerStopped,
    /// Artifact copied out of the container.
    ArtifactCopied,
    /// Application restarted without the profiler.
    NormalRestart,
}

/// Transition request for a [`ProfiledRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunEvent {
    /// Memory limit raised.
    MemoryRaised,
    /// Managed processes killed.
    ProcessesKilled,
    /// Profiler started.
    ProfilerStarted,
    /// Profiler stopped.
    ProfilerStopped,
    /// Artifact copied.
    ArtifactCopied,
    /// Application restarted normally.
    NormalRestart,
}

/// Out-of-order transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {event:?} from {from:?}")]
pub struct TransitionError {
    /// State the run was in.
    pub from: RunState,
    /// Rejected event.
    pub event: RunEvent,
}

/// Progress of one profiled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfiledRun {
    state: RunState,
    processes_killed: bool,
}

impl ProfiledRun {
    /// A run in `Idle`.
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            processes_killed: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Apply a transition.
    ///
    /// Steps must happen in order, except that a normal restart is accepted
    /// from any state once processes were killed: that is the cleanup path.
    pub fn apply(&mut self, event: RunEvent) -> Result<RunState, TransitionError> {
        use RunState::*;
        let next = match (self.state, event) {
            (Idle, RunEvent::MemoryRaised) => MemoryRaised,
            (MemoryRaised, RunEvent::ProcessesKilled) => ProcessesKilled,
            (ProcessesKilled, RunEvent::ProfilerStarted) => ProfilerRunning,
            (ProfilerRunning, RunEvent::ProfilerStopped) => ProfilerStopped,
            (ProfilerStopped, RunEvent::ArtifactCopied) => ArtifactCopied,
            (state, RunEvent::NormalRestart) if self.processes_killed && state != NormalRestart => {
                NormalRestart
            }
            (from, event) => return Err(TransitionError { from, event }),
        };
        if next == ProcessesKilled {
            self.processes_killed = true;
        }
        self.state = next;
        Ok(next)
    }

    /// True if processes were killed and the application has not been restarted.
    pub fn needs_restart(&self) -> bool {
        self.processes_killed && self.state != RunState::NormalRestart
    }
}

impl Default for ProfiledRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Step outcomes fed to the [`SessionMachine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Target container resolved.
    TargetResolved,
    /// Memory limit raised and verified.
    MemoryRaised,
    /// Target process resolved.
    ProcessVerified {
        /// Pid of the application before the restart.
        pid: u32,
    },
    /// Managed processes killed.
    ProcessesKilled,
    /// Application running under the profiler.
    ProfilerAttached {
        /// Pid of the profiled process.
        pid: u32,
    },
    /// Hold period started.
    HoldStarted,
    /// Hold period finished (elapsed or cancelled).
    HoldFinished,
    /// Profiler signalled and drained.
    ProfilerStopped,
    /// Artifact copied to the local machine.
    ArtifactCollected,
    /// A step failed.
    StepFailed {
        /// What went wrong.
        error: String,
    },
    /// Application restarted normally during cleanup.
    RestartedNormally,
    /// Cleanup (restart and memory restoration) done.
    CleanupFinished,
}

/// Work the runner must perform next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Raise the container memory limit.
    RaiseMemory,
    /// Find the process to profile.
    ResolveProcess,
    /// Kill the managed processes.
    KillProcesses,
    /// Start the application under the profiler.
    StartProfiler,
    /// Hold for the configured duration while load runs.
    Hold,
    /// Signal the profiler to flush and wait out the drain period.
    StopProfiler,
    /// Copy the artifact out.
    CollectArtifact,
    /// Undo temporary changes.
    Cleanup {
        /// Restart the application without the profiler.
        restart_normally: bool,
        /// Restore the original memory limit.
        restore_memory: bool,
    },
    /// Session is over with this status.
    Finish(SessionStatus),
}

/// Profiling session sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMachine {
    status: SessionStatus,
    run: ProfiledRun,
    memory_touched: bool,
    processes_touched: bool,
    collected: bool,
    cleaning: bool,
    failure: Option<String>,
}

impl SessionMachine {
    /// A session in `Initializing`.
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Initializing,
            run: ProfiledRun::new(),
            memory_touched: false,
            processes_touched: false,
            collected: false,
            cleaning: false,
            failure: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Container-level progress.
    pub fn run_state(&self) -> RunState {
        self.run.state()
    }

    /// First failure recorded, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Process an event and return the new machine plus actions to execute.
    pub fn on_event(mut self, event: SessionEvent) -> (Self, Vec<SessionAction>) {
        use SessionStatus as S;

        if self.status.is_terminal() {
            return (self, vec![]);
        }

        match (self.status, event) {
            // Cleanup failures are reported by the runner, they do not change the outcome.
            (_, SessionEvent::StepFailed { .. }) if self.cleaning => (self, vec![]),
            (_, SessionEvent::StepFailed { error }) => {
                self.failure = Some(error);
                let cleanup = self.begin_cleanup();
                (self, vec![cleanup])
            }
            (_, SessionEvent::RestartedNormally) if self.cleaning => {
                // Only fails when nothing was killed; the restart is harmless then.
                let _ = self.run.apply(RunEvent::NormalRestart);
                (self, vec![])
            }
            (_, SessionEvent::CleanupFinished) if self.cleaning => {
                let status = if self.collected && self.failure.is_none() {
                    S::Completed
                } else {
                    S::Failed
                };
                self.status = status;
                (self, vec![SessionAction::Finish(status)])
            }
            _ if self.cleaning => (self, vec![]),

            (S::Initializing, SessionEvent::TargetResolved) => {
                self.memory_touched = true;
                (self, vec![SessionAction::RaiseMemory])
            }
            (S::Initializing, SessionEvent::MemoryRaised) if self.memory_touched => {
                self.status = S::MemoryIncreased;
                let _ = self.run.apply(RunEvent::MemoryRaised);
                (self, vec![SessionAction::ResolveProcess])
            }
            (S::MemoryIncreased, SessionEvent::ProcessVerified { .. }) => {
                self.status = S::ProcessVerified;
                self.processes_touched = true;
                (self, vec![SessionAction::KillProcesses])
            }
            (S::ProcessVerified, SessionEvent::ProcessesKilled) => {
                let _ = self.run.apply(RunEvent::ProcessesKilled);
                (self, vec![SessionAction::StartProfiler])
            }
            (S::ProcessVerified, SessionEvent::ProfilerAttached { .. })
                if self.run.state() == RunState::ProcessesKilled =>
            {
                self.status = S::ProfilerAttached;
                let _ = self.run.apply(RunEvent::ProfilerStarted);
                (self, vec![SessionAction::Hold])
            }
            (S::ProfilerAttached, SessionEvent::HoldStarted) => {
                self.status = S::Running;
                (self, vec![])
            }
            (S::Running, SessionEvent::HoldFinished) => {
                self.status = S::Stopping;
                (self, vec![SessionAction::StopProfiler])
            }
            (S::Stopping, SessionEvent::ProfilerStopped) => {
                let _ = self.run.apply(RunEvent::ProfilerStopped);
                (self, vec![SessionAction::CollectArtifact])
            }
            (S::Stopping, SessionEvent::ArtifactCollected)
                if self.run.state() == RunState::ProfilerStopped =>
            {
                self.status = S::Collected;
                self.collected = true;
                let _ = self.run.apply(RunEvent::ArtifactCopied);
                let cleanup = self.begin_cleanup();
                (self, vec![cleanup])
            }

            // Invalid transitions - stay in current state
            _ => (self, vec![]),
        }
    }

    fn begin_cleanup(&mut self) -> SessionAction {
        self.cleaning = true;
        SessionAction::Cleanup {
            restart_normally: self.processes_touched,
            restore_memory: self.memory_touched,
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(events: Vec<SessionEvent>) -> (SessionMachine, Vec<SessionAction>) {
        let mut machine = SessionMachine::new();
        let mut all = Vec::new();
        for event in events {
            let (next, actions) = machine.on_event(event);
            machine = next;
            all.extend(actions);
        }
        (machine, all)
    }

    fn happy_path() -> Vec<SessionEvent> {
        vec![
            SessionEvent::TargetResolved,
            SessionEvent::MemoryRaised,
            SessionEvent::ProcessVerified { pid: 10 },
            SessionEvent::ProcessesKilled,
            SessionEvent::ProfilerAttached { pid: 11 },
            SessionEvent::HoldStarted,
            SessionEvent::HoldFinished,
            SessionEvent::ProfilerStopped,
            SessionEvent::ArtifactCollected,
        ]
    }

    // ===========================================================================
    // Profiled run
    // ===========================================================================

    #[test]
    fn run_follows_order() {
        let mut run = ProfiledRun::new();
        assert_eq!(run.apply(RunEvent::MemoryRaised), Ok(RunState::MemoryRaised));
        assert!(!run.needs_restart());
        assert_eq!(run.apply(RunEvent::ProcessesKilled), Ok(RunState::ProcessesKilled));
        assert!(run.needs_restart());
        assert_eq!(run.apply(RunEvent::ProfilerStarted), Ok(RunState::ProfilerRunning));
        assert_eq!(run.apply(RunEvent::ProfilerStopped), Ok(RunState::ProfilerStopped));
        assert_eq!(run.apply(RunEvent::ArtifactCopied), Ok(RunState::ArtifactCopied));
        assert_eq!(run.apply(RunEvent::NormalRestart), Ok(RunState::NormalRestart));
        assert!(!run.needs_restart());
    }

    #[test]
    fn run_rejects_skipped_steps() {
        let mut run = ProfiledRun::new();
        let err = run.apply(RunEvent::ProfilerStarted).unwrap_err();
        assert_eq!(err.from, RunState::Idle);
        assert_eq!(run.apply(RunEvent::NormalRestart).unwrap_err().event, RunEvent::NormalRestart);
    }

    #[test]
    fn run_restarts_from_any_state_after_kill() {
        let mut run = ProfiledRun::new();
        run.apply(RunEvent::MemoryRaised).unwrap();
        run.apply(RunEvent::ProcessesKilled).unwrap();
        assert_eq!(run.apply(RunEvent::NormalRestart), Ok(RunState::NormalRestart));
        assert!(run.apply(RunEvent::NormalRestart).is_err());
    }

    // ===========================================================================
    // Session machine
    // ===========================================================================

    #[test]
    fn happy_path_completes() {
        let mut events = happy_path();
        events.push(SessionEvent::RestartedNormally);
        events.push(SessionEvent::CleanupFinished);
        let (machine, actions) = drive(events);

        assert_eq!(
            actions,
            vec![
                SessionAction::RaiseMemory,
                SessionAction::ResolveProcess,
                SessionAction::KillProcesses,
                SessionAction::StartProfiler,
                SessionAction::Hold,
                SessionAction::StopProfiler,
                SessionAction::CollectArtifact,
                SessionAction::Cleanup {
                    restart_normally: true,
                    restore_memory: true
                },
                SessionAction::Finish(SessionStatus::Completed),
            ]
        );
        assert_eq!(machine.status(), SessionStatus::Completed);
        assert_eq!(machine.run_state(), RunState::NormalRestart);
    }

    #[test]
    fn failure_before_raise_needs_no_restoration() {
        let (machine, actions) = drive(vec![
            SessionEvent::StepFailed {
                error: "container not found".into(),
            },
            SessionEvent::CleanupFinished,
        ]);
        assert_eq!(
            actions,
            vec![
                SessionAction::Cleanup {
                    restart_normally: false,
                    restore_memory: false
                },
                SessionAction::Finish(SessionStatus::Failed),
            ]
        );
        assert_eq!(machine.failure(), Some("container not found"));
    }

    #[test]
    fn failed_raise_still_restores() {
        let (_, actions) = drive(vec![
            SessionEvent::TargetResolved,
            SessionEvent::StepFailed {
                error: "update failed".into(),
            },
        ]);
        assert_eq!(
            actions.last(),
            Some(&SessionAction::Cleanup {
                restart_normally: false,
                restore_memory: true
            })
        );
    }

    #[test]
    fn failure_after_kill_restarts_and_restores() {
        let (machine, actions) = drive(vec![
            SessionEvent::TargetResolved,
            SessionEvent::MemoryRaised,
            SessionEvent::ProcessVerified { pid: 10 },
            SessionEvent::StepFailed {
                error: "valgrind missing".into(),
            },
            SessionEvent::CleanupFinished,
        ]);
        assert!(actions.contains(&SessionAction::Cleanup {
            restart_normally: true,
            restore_memory: true
        }));
        assert_eq!(machine.status(), SessionStatus::Failed);
    }

    #[test]
    fn cleanup_is_issued_once() {
        let (_, actions) = drive(vec![
            SessionEvent::TargetResolved,
            SessionEvent::StepFailed { error: "a".into() },
            SessionEvent::StepFailed { error: "b".into() },
        ]);
        let cleanups = actions
            .iter()
            .filter(|a| matches!(a, SessionAction::Cleanup { .. }))
            .count();
        assert_eq!(cleanups, 1);
    }

    #[test]
    fn copy_failure_marks_failed() {
        let mut events = happy_path();
        events.truncate(8);
        events.push(SessionEvent::StepFailed {
            error: "docker cp failed".into(),
        });
        events.push(SessionEvent::CleanupFinished);
        let (machine, actions) = drive(events);
        assert_eq!(machine.status(), SessionStatus::Failed);
        assert_eq!(actions.last(), Some(&SessionAction::Finish(SessionStatus::Failed)));
    }

    #[test]
    fn cleanup_failure_does_not_change_outcome() {
        let mut events = happy_path();
        events.push(SessionEvent::StepFailed {
            error: "restart failed".into(),
        });
        events.push(SessionEvent::CleanupFinished);
        let (machine, _) = drive(events);
        assert_eq!(machine.status(), SessionStatus::Completed);
        assert_eq!(machine.failure(), None);
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let (machine, actions) = drive(vec![
            SessionEvent::ProfilerAttached { pid: 1 },
            SessionEvent::ArtifactCollected,
            SessionEvent::HoldFinished,
        ]);
        assert!(actions.is_empty());
        assert_eq!(machine.status(), SessionStatus::Initializing);
    }

    #[test]
    fn terminal_state_absorbs_events() {
        let (machine, actions) = drive(vec![
            SessionEvent::StepFailed { error: "x".into() },
            SessionEvent::CleanupFinished,
            SessionEvent::TargetResolved,
        ]);
        assert_eq!(machine.status(), SessionStatus::Failed);
        assert_eq!(actions.len(), 2);
    }
}
