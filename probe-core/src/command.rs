//! Shell command construction.
//!
//! Remote commands are strings executed by a POSIX shell on the device, so
//! every argument that did not come from this crate is quoted here, once,
//! before the preparation pipeline sees the command.

use std::fmt;

/// POSIX quoting and word splitting.
///
/// `quote` leaves words made of safe characters alone and single-quotes the
/// rest; `split` undoes it and rejects unterminated quotes.
pub use shell_words::{quote, split};

/// A command line assembled from quoted arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    parts: Vec<String>,
}

impl ShellCommand {
    /// Start a command with the given program.
    pub fn new(program: &str) -> Self {
        Self {
            parts: vec![quote(program).into_owned()],
        }
    }

    /// Append one argument, quoted.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.parts.push(quote(arg.as_ref()).into_owned());
        self
    }

    /// Append several arguments, each quoted.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.parts.push(quote(arg.as_ref()).into_owned());
        }
        self
    }

    /// Append a fragment verbatim (redirections, `||`, pipes).
    ///
    /// Only for constant fragments written in this crate.
    pub fn raw(mut self, fragment: &str) -> Self {
        self.parts.push(fragment.to_string());
        self
    }

    /// Render the command line.
    pub fn build(&self) -> String {
        self.parts.join(" ")
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Signals sent to processes inside containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Graceful termination; valgrind writes its report on it.
    Term,
    /// Interrupt.
    Int,
    /// Forceful kill.
    Kill,
}

impl Signal {
    /// Signal name without the `SIG` prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Int => "INT",
            Signal::Kill => "KILL",
        }
    }

    /// `-TERM` style flag for kill/pkill/killall.
    pub fn flag(&self) -> String {
        format!("-{}", self.as_str())
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The container command vocabulary.
///
/// Every builder returns a plain `docker ...` line; privilege elevation and
/// diagnostic-shell wrapping are applied later by
/// [`CommandPolicy`](crate::CommandPolicy).
pub mod docker {
    use super::{ShellCommand, Signal};

    /// `docker ps` line format: id, name, image, status.
    pub const PS_FORMAT: &str = r"{{.ID}}\t{{.Names}}\t{{.Image}}\t{{.Status}}";
    /// `docker stats` line format: usage / limit, mem %, cpu %.
    pub const STATS_FORMAT: &str = r"{{.MemUsage}}\t{{.MemPerc}}\t{{.CPUPerc}}";
    /// `docker inspect` format: name, image, status, created.
    pub const INSPECT_FORMAT: &str = "{{.Name}}|{{.Config.Image}}|{{.State.Status}}|{{.Created}}";

    /// `docker --version`.
    pub fn version() -> String {
        ShellCommand::new("docker").arg("--version").build()
    }

    /// Running containers whose name matches `pattern`.
    pub fn ps_by_name(pattern: &str) -> String {
        ShellCommand::new("docker")
            .arg("ps")
            .arg("--filter")
            .arg(format!("name={}", pattern))
            .arg("--format")
            .arg(PS_FORMAT)
            .build()
    }

    /// Running containers created from an image matching `pattern`.
    pub fn ps_by_image(pattern: &str) -> String {
        ShellCommand::new("docker")
            .arg("ps")
            .arg("--filter")
            .arg(format!("ancestor={}", pattern))
            .arg("--format")
            .arg(PS_FORMAT)
            .build()
    }

    /// Name, image, status and creation time of one container.
    pub fn inspect(container: &str) -> String {
        ShellCommand::new("docker")
            .arg("inspect")
            .arg("--format")
            .arg(INSPECT_FORMAT)
            .arg(container)
            .build()
    }

    /// Published ports.
    pub fn port(container: &str) -> String {
        ShellCommand::new("docker").arg("port").arg(container).build()
    }

    /// One stats sample.
    pub fn stats(container: &str) -> String {
        ShellCommand::new("docker")
            .arg("stats")
            .arg("--no-stream")
            .arg("--format")
            .arg(STATS_FORMAT)
            .arg(container)
            .build()
    }

    /// Live memory limit update. Swap is pinned to the same value.
    pub fn update_memory(container: &str, limit: &str) -> String {
        ShellCommand::new("docker")
            .arg("update")
            .arg("--memory")
            .arg(limit)
            .arg("--memory-swap")
            .arg(limit)
            .arg(container)
            .build()
    }

    /// Run a program inside the container.
    pub fn exec<I, S>(container: &str, argv: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ShellCommand::new("docker")
            .arg("exec")
            .arg(container)
            .args(argv)
            .build()
    }

    /// Run a shell script inside the container.
    pub fn exec_sh(container: &str, script: &str) -> String {
        exec(container, ["sh", "-c", script])
    }

    /// Run a shell script inside the container, detached.
    pub fn exec_detached(container: &str, workdir: Option<&str>, script: &str) -> String {
        let mut cmd = ShellCommand::new("docker").arg("exec").arg("-d");
        if let Some(dir) = workdir {
            cmd = cmd.arg("-w").arg(dir);
        }
        cmd.arg(container).arg("sh").arg("-c").arg(script).build()
    }

    /// Copy a file out of the container.
    pub fn cp_from(container: &str, container_path: &str, host_path: &str) -> String {
        ShellCommand::new("docker")
            .arg("cp")
            .arg(format!("{}:{}", container, container_path))
            .arg(host_path)
            .build()
    }

    /// Copy a file into the container.
    pub fn cp_to(host_path: &str, container: &str, container_path: &str) -> String {
        ShellCommand::new("docker")
            .arg("cp")
            .arg(host_path)
            .arg(format!("{}:{}", container, container_path))
            .build()
    }

    /// Recent log lines.
    pub fn logs(container: &str, lines: u32) -> String {
        ShellCommand::new("docker")
            .arg("logs")
            .arg("--tail")
            .arg(lines.to_string())
            .arg(container)
            .build()
    }

    /// Full process listing.
    pub fn ps_aux(container: &str) -> String {
        exec(container, ["ps", "aux"])
    }

    /// Pids whose command line matches `pattern`.
    pub fn pgrep(container: &str, pattern: &str) -> String {
        exec(container, ["pgrep", "-f", pattern])
    }

    /// Details of one pid, no header.
    pub fn ps_pid(container: &str, pid: u32) -> String {
        exec(
            container,
            [
                "ps",
                "-p",
                &pid.to_string(),
                "-o",
                "pid,pcpu,rss,args",
                "--no-headers",
            ],
        )
    }

    /// Signal one pid.
    pub fn kill(container: &str, signal: Signal, pid: u32) -> String {
        exec(container, ["kill", &signal.flag(), &pid.to_string()])
    }

    /// Signal every process whose command line matches `pattern`.
    pub fn pkill(container: &str, signal: Signal, pattern: &str) -> String {
        exec(container, ["pkill", &signal.flag(), "-f", pattern])
    }

    /// Signal every process named `name`.
    pub fn killall(container: &str, signal: Signal, name: &str) -> String {
        exec(container, ["killall", &signal.flag(), name])
    }

    /// Location of a binary, non-zero when absent.
    pub fn which(container: &str, binary: &str) -> String {
        exec(container, ["which", binary])
    }

    /// Remove a file, ignoring absence.
    pub fn rm(container: &str, path: &str) -> String {
        exec(container, ["rm", "-f", path])
    }

    /// Create a directory and its parents.
    pub fn mkdir(container: &str, path: &str) -> String {
        exec(container, ["mkdir", "-p", path])
    }
}
