//! Supported memory profilers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error for an unrecognised profiler name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown profiler: {0} (expected valgrind or asan)")]
pub struct UnknownProfiler(pub String);

/// The two profiler kinds a session can run under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilerKind {
    /// Valgrind memcheck, XML leak report.
    #[default]
    Valgrind,
    /// AddressSanitizer leak detection, text log.
    Asan,
}

impl ProfilerKind {
    /// Lowercase name, used in artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfilerKind::Valgrind => "valgrind",
            ProfilerKind::Asan => "asan",
        }
    }

    /// File extension of the profiler's report.
    pub fn extension(&self) -> &'static str {
        match self {
            ProfilerKind::Valgrind => "xml",
            ProfilerKind::Asan => "log",
        }
    }

    /// Artifact file name for a session: `<session>_<kind>.<ext>`.
    pub fn artifact_name(&self, session_id: &str) -> String {
        format!("{}_{}.{}", session_id, self.as_str(), self.extension())
    }
}

impl fmt::Display for ProfilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfilerKind {
    type Err = UnknownProfiler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valgrind" => Ok(ProfilerKind::Valgrind),
            "asan" | "addresssanitizer" => Ok(ProfilerKind::Asan),
            _ => Err(UnknownProfiler(s.to_string())),
        }
    }
}
