//! Docker-style memory sizes.
//!
//! Docker treats every unit as binary: `5g`, `5GB` and `5GiB` all mean
//! 5 * 1024^3 bytes. `docker stats` prints limits like `1.953GiB`, so the
//! number part may be fractional.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a memory size.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryLimitError {
    /// Empty input.
    #[error("empty memory limit")]
    Empty,
    /// Number part could not be parsed.
    #[error("invalid memory limit number: {0}")]
    InvalidNumber(String),
    /// Unit suffix not recognised.
    #[error("invalid memory limit unit: {0}")]
    InvalidUnit(String),
}

/// A memory limit as written by the operator, plus its size in bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryLimit {
    raw: String,
    bytes: u64,
}

impl MemoryLimit {
    /// Parse a docker memory size (`5g`, `2GB`, `512MiB`, `1.953GiB`, `1024`).
    pub fn parse(input: &str) -> Result<Self, MemoryLimitError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(MemoryLimitError::Empty);
        }

        let split = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(raw.len());
        let (number, unit) = raw.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| MemoryLimitError::InvalidNumber(raw.to_string()))?;

        let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" | "kib" => 1 << 10,
            "m" | "mb" | "mib" => 1 << 20,
            "g" | "gb" | "gib" => 1 << 30,
            "t" | "tb" | "tib" => 1 << 40,
            other => return Err(MemoryLimitError::InvalidUnit(other.to_string())),
        };

        Ok(Self {
            raw: raw.to_string(),
            bytes: (value * multiplier as f64).round() as u64,
        })
    }

    /// Size in bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// The limit exactly as written, suitable for `docker update --memory`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when both sizes agree within `tolerance` (fraction of `self`).
    ///
    /// `docker stats` rounds to three decimals, so exact comparison fails.
    pub fn approx_eq(&self, other: &MemoryLimit, tolerance: f64) -> bool {
        let diff = self.bytes.abs_diff(other.bytes) as f64;
        diff <= self.bytes as f64 * tolerance
    }
}

impl PartialEq for MemoryLimit {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for MemoryLimit {}

impl FromStr for MemoryLimit {
    type Err = MemoryLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MemoryLimit {
    type Error = MemoryLimitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemoryLimit> for String {
    fn from(value: MemoryLimit) -> Self {
        value.raw
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
