//! Discovery and managed-process patterns.

/// Container name patterns, in priority order.
pub const DEFAULT_NAME_PATTERNS: &[&str] = &[
    "ui",
    "frontend",
    "netconf-ui",
    "web-ui",
    "netconf",
    "netconfd",
    "confd",
    "sysrepo",
    "backend",
    "api",
    "server",
    "yanglint",
    "netopeer",
];

/// Image patterns tried when no name pattern verifies.
pub const DEFAULT_IMAGE_PATTERNS: &[&str] = &["netconf", "confd", "sysrepo", "ui"];

/// Extended regex a container's `ps aux` must match to count as hosting the application.
pub const VERIFY_PATTERN: &str = "netconf|confd";

/// Command-line fragments that mark a managed process.
pub const DEFAULT_MANAGED_PATTERNS: &[&str] = &[
    "netconfd",
    "netconf-server",
    "confd",
    "sshd_netconf",
    "ietf-netconf",
    "yang-netconf",
    "restconf",
    "gnmi",
    "sysrepod",
    "sysrepo",
    "netopeer2",
    "yanglint",
];

/// Patterns double-checked with `pgrep -f` after parsing `ps aux`.
pub const PGREP_PATTERNS: &[&str] = &["netconfd", "confd"];

/// Patterns hit by the name-based broad kill.
pub const BROAD_KILL_PATTERNS: &[&str] = &["netconfd", "confd", "netconf-server"];

/// Fragments of our own probing commands that must never be classified.
const SELF_MARKERS: &[&str] = &["ps aux", "pgrep", "pkill", "killall", "grep "];

/// Return the first pattern that `command` matches, case-insensitively.
///
/// The probing commands this crate issues are never classified.
pub fn classify<'a>(command: &str, patterns: &[&'a str]) -> Option<&'a str> {
    let lower = command.to_ascii_lowercase();
    if SELF_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    patterns
        .iter()
        .copied()
        .find(|p| lower.contains(&p.to_ascii_lowercase()))
}

/// Match `text` against a `|`-separated alternation of literals.
pub fn matches_alternation(text: &str, alternation: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    alternation
        .split('|')
        .filter(|p| !p.is_empty())
        .any(|p| lower.contains(&p.to_ascii_lowercase()))
}
