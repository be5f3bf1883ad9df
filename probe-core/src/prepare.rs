//! Command preparation pipeline.
//!
//! Container-management commands (and only those) are rewritten before they
//! reach the device:
//!
//! 1. `sudo ` is prepended when the host requires it.
//! 2. The command is wrapped as `<diag command> -c '<command>'` when the host
//!    requires the diagnostic shell and the session is not already inside it.
//!
//! A wrapped command no longer starts with a container prefix, so feeding the
//! output back through the pipeline leaves it unchanged.

use probe_types::{RemoteHost, DEFAULT_DIAG_COMMAND};

use crate::command::quote;

/// Literal prefixes that mark a container-management command.
pub const CONTAINER_PREFIXES: &[&str] = &["docker ", "sudo docker "];

/// How container commands must be rewritten for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    /// Wrap container commands in the diagnostic shell.
    pub use_diag_shell: bool,
    /// Prefix container commands with `sudo`.
    pub use_sudo: bool,
    /// Command that enters the diagnostic shell.
    pub diag_command: String,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            use_diag_shell: false,
            use_sudo: false,
            diag_command: DEFAULT_DIAG_COMMAND.to_string(),
        }
    }
}

impl CommandPolicy {
    /// Policy derived from a host's capability flags.
    pub fn for_host(host: &RemoteHost) -> Self {
        Self {
            use_diag_shell: host.use_diag_shell,
            use_sudo: host.use_sudo_docker,
            diag_command: host.diag_command.clone(),
        }
    }

    /// True if `command` is a container-management command.
    pub fn is_container_command(command: &str) -> bool {
        let trimmed = command.trim_start();
        CONTAINER_PREFIXES.iter().any(|p| trimmed.starts_with(p))
    }

    /// Rewrite `command` for execution.
    ///
    /// `in_diag_shell` is true once the session is known to reach container
    /// tooling without wrapping.
    pub fn prepare(&self, command: &str, in_diag_shell: bool) -> String {
        let command = command.trim();
        if !Self::is_container_command(command) {
            return command.to_string();
        }

        let mut prepared = command.to_string();
        if self.use_sudo && !prepared.starts_with("sudo ") {
            prepared = format!("sudo {}", prepared);
        }
        if self.use_diag_shell && !in_diag_shell {
            prepared = format!("{} -c {}", self.diag_command, quote(&prepared));
        }
        prepared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(diag: bool, sudo: bool) -> CommandPolicy {
        CommandPolicy {
            use_diag_shell: diag,
            use_sudo: sudo,
            diag_command: DEFAULT_DIAG_COMMAND.to_string(),
        }
    }

    #[test]
    fn non_container_commands_pass_through() {
        let p = policy(true, true);
        assert_eq!(p.prepare("uname -a", false), "uname -a");
        assert_eq!(p.prepare("  mkdir -p /tmp/x ", false), "mkdir -p /tmp/x");
        // Mentions docker but does not start with it.
        assert_eq!(p.prepare("echo docker ps", false), "echo docker ps");
    }

    #[test]
    fn sudo_only() {
        let p = policy(false, true);
        assert_eq!(p.prepare("docker ps", false), "sudo docker ps");
        assert_eq!(p.prepare("sudo docker ps", false), "sudo docker ps");
    }

    #[test]
    fn sudo_and_diag_shell() {
        let p = policy(true, true);
        assert_eq!(
            p.prepare("docker ps", false),
            "diag shell host -c 'sudo docker ps'"
        );
    }

    #[test]
    fn diag_shell_escapes_inner_quotes() {
        let p = policy(true, false);
        let prepared = p.prepare("docker exec c1 sh -c 'ps aux'", false);
        assert_eq!(
            prepared,
            r"diag shell host -c 'docker exec c1 sh -c '\''ps aux'\'''"
        );
        let inner = crate::command::split(&prepared).unwrap();
        assert_eq!(inner.last().unwrap(), "docker exec c1 sh -c 'ps aux'");
    }

    #[test]
    fn already_inside_diag_shell_is_not_wrapped() {
        let p = policy(true, true);
        assert_eq!(p.prepare("docker ps", true), "sudo docker ps");
    }

    #[test]
    fn wrapping_is_idempotent() {
        let commands = [
            "docker ps --filter name=ui",
            "sudo docker update --memory 5g c1",
            "docker exec c1 sh -c 'echo it'\\''s'",
            "hostname",
        ];
        for p in [policy(true, true), policy(true, false), policy(false, true), policy(false, false)] {
            for cmd in commands {
                let once = p.prepare(cmd, false);
                let twice = p.prepare(&once, false);
                assert_eq!(once, twice, "policy {:?} cmd {}", p, cmd);
                let inside = p.prepare(&once, true);
                assert_eq!(once, inside, "policy {:?} cmd {}", p, cmd);
            }
        }
    }

    #[test]
    fn policy_from_host() {
        let mut host = RemoteHost::new("dev", "admin");
        host.use_diag_shell = false;
        host.diag_command = "vsh".into();
        let p = CommandPolicy::for_host(&host);
        assert!(!p.use_diag_shell);
        assert!(p.use_sudo);
        assert_eq!(p.diag_command, "vsh");
    }
}
