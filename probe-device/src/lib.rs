//! # probe-device
//!
//! Remote session and container/process manager for leakprobe.
//!
//! A [`RemoteSession`] is an authenticated command and file channel to one
//! device; it rewrites container commands through the preparation pipeline
//! (sudo, diagnostic shell) before handing them to a [`RemoteShell`]. The
//! [`ContainerManager`] builds on a session to discover containers, manage
//! the processes inside them, change memory limits live and run the
//! application under a profiler.
//!
//! ```text
//! ContainerManager → RemoteSession → RemoteShell → ssh / scp
//!                         ↓
//!                 probe-core (command vocabulary, parsers)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod error;
pub mod session;
pub mod shell;

pub use container::{ContainerManager, KillReport, ManagerConfig};
pub use error::DeviceError;
pub use session::{RemoteSession, DEFAULT_COMMAND_TIMEOUT};
pub use shell::{
    CommandOutput, FakeContainer, FakeDockerHost, MockShell, RemoteShell, ShellError,
    ShellFactory, SshShell, SshShellFactory,
};
