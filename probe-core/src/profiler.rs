//! Profiler invocation lines.
//!
//! The profiler's own options always come before the application command;
//! an application argument placed earlier would be parsed as a profiler
//! option.

use probe_types::ProfilerKind;

use crate::command::quote;

/// Directory inside the container where profiler output is written.
pub const ARTIFACT_DIR: &str = "/tmp/memory_analysis";

const VALGRIND_DEFAULTS: &[&str] = &[
    "--tool=memcheck",
    "--leak-check=full",
    "--show-leak-kinds=all",
    "--track-origins=yes",
    "--xml=yes",
    "--child-silent-after-fork=yes",
];

const ASAN_DEFAULTS: &[&str] = &[
    "detect_leaks=1",
    "abort_on_error=0",
    "fast_unwind_on_malloc=0",
];

/// A fully resolved profiler launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerInvocation {
    /// Profiler kind.
    pub kind: ProfilerKind,
    /// Report path inside the container.
    pub output_path: String,
    /// Profiler options, output option excluded.
    pub options: Vec<String>,
    /// Application start command.
    pub app_command: String,
}

impl ProfilerInvocation {
    /// Build an invocation with default or overridden options.
    ///
    /// For valgrind, `options` are command-line flags; for ASan they are
    /// `key=value` entries of `ASAN_OPTIONS`. The output location is always
    /// set by this type and any output option in `options` is dropped.
    pub fn new(
        kind: ProfilerKind,
        app_command: &str,
        output_path: &str,
        options: Option<&[String]>,
    ) -> Self {
        let defaults = match kind {
            ProfilerKind::Valgrind => VALGRIND_DEFAULTS,
            ProfilerKind::Asan => ASAN_DEFAULTS,
        };
        let mut options: Vec<String> = match options {
            Some(opts) => opts.to_vec(),
            None => defaults.iter().map(|s| s.to_string()).collect(),
        };
        options.retain(|o| !o.starts_with("--xml-file=") && !o.starts_with("log_path="));
        if kind == ProfilerKind::Valgrind && !options.iter().any(|o| o.starts_with("--xml=")) {
            options.push("--xml=yes".to_string());
        }

        Self {
            kind,
            output_path: output_path.to_string(),
            options,
            app_command: app_command.trim().to_string(),
        }
    }

    /// Report path for a session inside [`ARTIFACT_DIR`].
    pub fn artifact_path(kind: ProfilerKind, session_id: &str) -> String {
        format!("{}/{}", ARTIFACT_DIR, kind.artifact_name(session_id))
    }

    /// The shell line to run inside the container.
    pub fn command_line(&self) -> String {
        match self.kind {
            ProfilerKind::Valgrind => {
                let mut parts = vec!["valgrind".to_string()];
                parts.extend(self.options.iter().map(|o| quote(o).into_owned()));
                parts.push(quote(&format!("--xml-file={}", self.output_path)).into_owned());
                parts.push(self.app_command.clone());
                parts.join(" ")
            }
            ProfilerKind::Asan => {
                let mut entries = vec![format!("log_path={}", self.output_path)];
                entries.extend(self.options.iter().cloned());
                format!(
                    "ASAN_OPTIONS={} {}",
                    quote(&entries.join(":")),
                    self.app_command
                )
            }
        }
    }

    /// Text that identifies the profiled process in `ps aux` output.
    pub fn process_marker(&self) -> String {
        match self.kind {
            ProfilerKind::Valgrind => "valgrind".to_string(),
            ProfilerKind::Asan => self.executable().to_string(),
        }
    }

    /// First word of the application command.
    pub fn executable(&self) -> &str {
        self.app_command.split_whitespace().next().unwrap_or("")
    }

    /// Binary that must exist in the container for this profiler to run.
    pub fn required_binary(&self) -> &str {
        match self.kind {
            ProfilerKind::Valgrind => "valgrind",
            ProfilerKind::Asan => self.executable(),
        }
    }

    /// Script that leaves the complete report at `output_path`.
    ///
    /// ASan appends the pid to `log_path`, so its per-process logs are
    /// concatenated; an empty file means no leak was reported.
    pub fn finalize_script(&self) -> Option<String> {
        match self.kind {
            ProfilerKind::Valgrind => None,
            ProfilerKind::Asan => {
                let path = quote(&self.output_path).into_owned();
                Some(format!(
                    "cat {path}.* > {path} 2>/dev/null; touch {path}",
                    path = path
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = "/usr/bin/netconfd --foreground";

    #[test]
    fn valgrind_defaults_precede_application() {
        let inv = ProfilerInvocation::new(
            ProfilerKind::Valgrind,
            APP,
            "/tmp/memory_analysis/s1_valgrind.xml",
            None,
        );
        assert_eq!(
            inv.command_line(),
            "valgrind '--tool=memcheck' '--leak-check=full' '--show-leak-kinds=all' \
             '--track-origins=yes' '--xml=yes' '--child-silent-after-fork=yes' \
             '--xml-file=/tmp/memory_analysis/s1_valgrind.xml' /usr/bin/netconfd --foreground"
        );
        let line = inv.command_line();
        assert!(line.find("--xml-file").unwrap() < line.find(APP).unwrap());
        assert_eq!(inv.process_marker(), "valgrind");
        assert_eq!(inv.required_binary(), "valgrind");
        assert!(inv.finalize_script().is_none());
    }

    #[test]
    fn custom_options_replace_defaults_but_keep_output() {
        let opts = vec![
            "--leak-check=summary".to_string(),
            "--xml-file=/elsewhere.xml".to_string(),
        ];
        let inv = ProfilerInvocation::new(ProfilerKind::Valgrind, APP, "/tmp/o.xml", Some(&opts));
        assert_eq!(
            inv.command_line(),
            "valgrind '--leak-check=summary' '--xml=yes' '--xml-file=/tmp/o.xml' /usr/bin/netconfd --foreground"
        );
    }

    #[test]
    fn asan_sets_environment() {
        let inv = ProfilerInvocation::new(ProfilerKind::Asan, APP, "/tmp/memory_analysis/s1_asan.log", None);
        assert_eq!(
            inv.command_line(),
            "ASAN_OPTIONS='log_path=/tmp/memory_analysis/s1_asan.log:detect_leaks=1:abort_on_error=0:fast_unwind_on_malloc=0' \
             /usr/bin/netconfd --foreground"
        );
        assert_eq!(inv.process_marker(), "/usr/bin/netconfd");
        assert_eq!(
            inv.finalize_script().unwrap(),
            "cat /tmp/memory_analysis/s1_asan.log.* > /tmp/memory_analysis/s1_asan.log 2>/dev/null; \
             touch /tmp/memory_analysis/s1_asan.log"
        );
    }

    #[test]
    fn artifact_path_per_kind() {
        assert_eq!(
            ProfilerInvocation::artifact_path(ProfilerKind::Valgrind, "s1"),
            "/tmp/memory_analysis/s1_valgrind.xml"
        );
        assert_eq!(
            ProfilerInvocation::artifact_path(ProfilerKind::Asan, "s1"),
            "/tmp/memory_analysis/s1_asan.log"
        );
    }
}
