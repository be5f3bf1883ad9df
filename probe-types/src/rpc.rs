//! Management protocol load: operations and per-request results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One RPC to replay against the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcOperation {
    /// Operation name, used as the key in sequence results.
    pub name: String,
    /// The RPC body placed inside the `<rpc>` envelope.
    pub payload: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// How many times to send it.
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    /// Pause between repeats, in seconds. Not applied after the last one.
    #[serde(default)]
    pub delay_secs: f64,
}

fn default_repeat_count() -> u32 {
    1
}

impl RpcOperation {
    /// Single-shot operation without delay.
    pub fn new(name: &str, payload: &str) -> Self {
        Self {
            name: name.to_string(),
            payload: payload.to_string(),
            description: String::new(),
            repeat_count: 1,
            delay_secs: 0.0,
        }
    }

    /// Delay between repeats.
    pub fn delay(&self) -> Duration {
        if self.delay_secs.is_finite() && self.delay_secs > 0.0 {
            Duration::from_secs_f64(self.delay_secs)
        } else {
            Duration::ZERO
        }
    }
}

/// Outcome of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcStatus {
    /// Reply carried no `rpc-error`.
    Success,
    /// Reply carried an `rpc-error`.
    Error,
    /// Transport failed before a reply arrived.
    Failed,
}

/// Result of one iteration of an [`RpcOperation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResult {
    /// Operation name.
    pub operation: String,
    /// One-based iteration index.
    pub iteration: u32,
    /// Message id sent.
    pub message_id: u64,
    /// When the request was sent.
    pub started_at: DateTime<Utc>,
    /// Round-trip time in milliseconds.
    pub latency_ms: f64,
    /// Classification.
    pub status: RpcStatus,
    /// Reply with the end-of-message marker removed.
    pub response: Option<String>,
    /// Error description for `Error` / `Failed`.
    pub error: Option<String>,
}

impl RpcResult {
    /// True when the reply was a success.
    pub fn is_success(&self) -> bool {
        self.status == RpcStatus::Success
    }
}
