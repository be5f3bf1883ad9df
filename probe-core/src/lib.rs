//! # probe-core
//!
//! Pure logic for leakprobe (no I/O, instant tests).
//!
//! Everything that decides *what* to send to a device lives here; the
//! device crate only executes the strings this crate produces and feeds the
//! output back through the parsers.
//!
//! - [`command`] - shell escaping and the container command vocabulary
//! - [`prepare`] - the sudo / diagnostic-shell wrapping pipeline
//! - [`ps`], [`stats`] - parsers for `ps`, `pgrep`, `docker ps/stats/inspect`
//! - [`process`] - default discovery and managed-process patterns
//! - [`profiler`] - profiler invocation lines
//! - [`state`] - profiling session and profiled-run state machines
//! - [`template`] - `{{var}}` substitution for setup hooks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod prepare;
pub mod process;
pub mod profiler;
pub mod ps;
pub mod state;
pub mod stats;
pub mod template;

pub use command::{docker, quote, ShellCommand, Signal};
pub use prepare::{CommandPolicy, CONTAINER_PREFIXES};
pub use process::{
    classify, matches_alternation, BROAD_KILL_PATTERNS, DEFAULT_IMAGE_PATTERNS,
    DEFAULT_MANAGED_PATTERNS, DEFAULT_NAME_PATTERNS, PGREP_PATTERNS, VERIFY_PATTERN,
};
pub use profiler::{ProfilerInvocation, ARTIFACT_DIR};
pub use ps::{parse_pgrep, parse_ps, parse_ps_pid, PsEntry};
pub use state::{
    ProfiledRun, RunEvent, RunState, SessionAction, SessionEvent, SessionMachine, TransitionError,
};
pub use stats::{parse_inspect_line, parse_ps_line, parse_stats, StatsParseError};
pub use template::render;
