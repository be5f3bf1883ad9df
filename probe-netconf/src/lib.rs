//! # probe-netconf
//!
//! Minimal NETCONF 1.0 client used to put RPC load on the application under
//! test while it runs under a profiler.
//!
//! Only the greeting exchange, end-of-message framing and ordered message ids
//! are implemented. The client is generic over the byte stream so it runs
//! over TCP in production and over `tokio::io::duplex` in tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod framing;
pub mod loader;

pub use client::{NetconfClient, NetconfConfig};
pub use error::NetconfError;
pub use framing::{FrameReader, DEFAULT_CAPABILITIES, MARKER};
pub use loader::{load_rpc_directory, load_rpc_file};
