//! Protocol client errors.

use probe_types::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from the NETCONF client and the RPC loader.
#[derive(Debug, Error)]
pub enum NetconfError {
    /// TCP connection could not be opened.
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        /// `host:port`.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// No reply within the configured timeout.
    #[error("no reply within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Socket error after connecting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream before the end-of-message marker.
    #[error("connection closed before end-of-message marker")]
    Closed,

    /// The greeting was missing or malformed.
    #[error("invalid greeting: {0}")]
    Greeting(String),

    /// A frame violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation on a closed session.
    #[error("not connected")]
    NotConnected,

    /// An RPC file could not be read.
    #[error("cannot read {path}: {source}")]
    Load {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl NetconfError {
    /// Failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetconfError::Connect { .. }
            | NetconfError::Timeout(_)
            | NetconfError::Io(_)
            | NetconfError::NotConnected => ErrorKind::Connection,
            NetconfError::Closed | NetconfError::Greeting(_) | NetconfError::Protocol(_) => {
                ErrorKind::Protocol
            }
            NetconfError::Load { .. } => ErrorKind::Io,
        }
    }
}
