//! Live snapshots of containers and the processes inside them.
//!
//! None of these are cached: the manager re-reads them from the device every
//! time, and a snapshot is stale the moment a process is killed.

use serde::{Deserialize, Serialize};

use crate::MemoryLimit;

/// A container as reported by `docker ps` / `docker inspect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Container id (short or full).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Lifecycle status text (`Up 3 hours`, `running`, ...).
    pub status: String,
    /// Current memory limit, if known.
    pub memory_limit: Option<MemoryLimit>,
    /// Current memory usage, if known.
    pub memory_usage: Option<MemoryLimit>,
    /// CPU usage in percent, if known.
    pub cpu_percent: Option<f64>,
    /// Published ports, one entry per `docker port` line.
    #[serde(default)]
    pub ports: Vec<String>,
    /// Creation timestamp as printed by docker.
    #[serde(default)]
    pub created: Option<String>,
}

impl Container {
    /// Minimal container record from a `docker ps` line.
    pub fn new(id: &str, name: &str, image: &str, status: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            image: image.to_string(),
            status: status.to_string(),
            memory_limit: None,
            memory_usage: None,
            cpu_percent: None,
            ports: Vec::new(),
            created: None,
        }
    }
}

/// One `docker stats --no-stream` sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// Memory in use.
    pub memory_usage: MemoryLimit,
    /// Memory limit in force.
    pub memory_limit: MemoryLimit,
    /// Memory usage in percent of the limit.
    pub memory_percent: f64,
    /// CPU usage in percent.
    pub cpu_percent: f64,
}

/// An application process inside a container.
///
/// Identity is `(container_id, pid)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedProcess {
    /// Container the process lives in.
    pub container_id: String,
    /// Process id inside the container's pid namespace.
    pub pid: u32,
    /// Short name / category (the pattern that matched, or the executable).
    pub name: String,
    /// Full command line.
    pub command: String,
    /// Resident memory in KB.
    pub memory_kb: u64,
    /// CPU usage in percent.
    pub cpu_percent: f64,
}

impl ManagedProcess {
    /// True if this is the same process as `other`.
    pub fn same_identity(&self, other: &ManagedProcess) -> bool {
        self.container_id == other.container_id && self.pid == other.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(container: &str, pid: u32) -> ManagedProcess {
        ManagedProcess {
            container_id: container.into(),
            pid,
            name: "netconfd".into(),
            command: "/usr/bin/netconfd --foreground".into(),
            memory_kb: 1024,
            cpu_percent: 0.5,
        }
    }

    #[test]
    fn identity_is_container_and_pid() {
        let a = process("c1", 42);
        let mut b = process("c1", 42);
        b.memory_kb = 9999;
        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&process("c2", 42)));
        assert!(!a.same_identity(&process("c1", 43)));
    }
}
