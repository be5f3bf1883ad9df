//! # probe-types
//!
//! Data model shared by every leakprobe crate.
//!
//! - [`RemoteHost`], [`Credentials`] - how to reach a device
//! - [`Container`], [`ContainerStats`], [`ManagedProcess`] - live snapshots
//! - [`MemoryLimit`] - docker-style memory sizes parsed into bytes
//! - [`RpcOperation`], [`RpcResult`] - management protocol load
//! - [`SessionId`], [`SessionStatus`], [`SessionSummary`] - profiling sessions
//! - [`TestScenario`], [`DeviceSpec`], [`TestResult`] - orchestrator input/output
//! - [`ErrorKind`] - the failure taxonomy every crate maps its errors onto

#![warn(missing_docs)]
#![warn(clippy::all)]

mod container;
mod error;
mod host;
mod memory;
mod profiler;
mod result;
mod rpc;
mod scenario;
mod session;

pub use container::{Container, ContainerStats, ManagedProcess};
pub use error::ErrorKind;
pub use host::{Credentials, RemoteHost, DEFAULT_DIAG_COMMAND};
pub use memory::{MemoryLimit, MemoryLimitError};
pub use profiler::{ProfilerKind, UnknownProfiler};
pub use result::{ResultStatus, TestResult};
pub use rpc::{RpcOperation, RpcResult, RpcStatus};
pub use scenario::{
    DeviceSpec, FileEdit, NetconfTarget, SetupHooks, TestScenario, DEFAULT_APP_COMMAND,
};
pub use session::{LoadReport, RestorationOutcome, SessionId, SessionStatus, SessionSummary};
