//! In-memory device running containers.
//!
//! `FakeDockerHost` understands the command vocabulary the manager issues
//! (after sudo and diagnostic-shell wrapping) and keeps enough state to make
//! the lifecycle observable: container memory limits, processes that ignore
//! signals, profiler reports written on exit, files on the device and inside
//! containers.

use super::{CommandOutput, RemoteShell, ShellError};
use async_trait::async_trait;
use probe_core::command::split;
use probe_types::{MemoryLimit, DEFAULT_DIAG_COMMAND};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const GIB: u64 = 1 << 30;
const MIB: u64 = 1 << 20;
const PROCESS_RSS_KB: u64 = 51_200;

#[derive(Debug, Clone)]
struct FakeProcess {
    pid: u32,
    command: String,
    asan_log: Option<String>,
}

/// A container on the fake device.
#[derive(Debug, Clone)]
pub struct FakeContainer {
    id: String,
    name: String,
    image: String,
    memory_limit: u64,
    memory_usage: u64,
    commands: Vec<String>,
    processes: Vec<FakeProcess>,
    binaries: HashSet<String>,
    files: HashMap<String, Vec<u8>>,
    ports: Vec<String>,
    logs: Vec<String>,
    scripts: Vec<String>,
}

impl FakeContainer {
    /// A running container with 2 GiB of memory and valgrind installed.
    pub fn new(id: &str, name: &str, image: &str) -> Self {
        let binaries = ["sh", "ps", "valgrind", "netconfd"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            image: image.to_string(),
            memory_limit: 2 * GIB,
            memory_usage: 512 * MIB,
            commands: Vec::new(),
            processes: Vec::new(),
            binaries,
            files: HashMap::new(),
            ports: vec!["830/tcp -> 0.0.0.0:830".to_string()],
            logs: vec!["netconfd: started".to_string()],
            scripts: Vec::new(),
        }
    }

    /// Add a running process.
    pub fn with_process(mut self, command: &str) -> Self {
        self.commands.push(command.to_string());
        self
    }

    /// Set the initial memory limit.
    pub fn with_memory_limit(mut self, limit: &str) -> Self {
        if let Ok(limit) = MemoryLimit::parse(limit) {
            self.memory_limit = limit.bytes();
        }
        self
    }

    /// Remove a binary from the container.
    pub fn without_binary(mut self, binary: &str) -> Self {
        self.binaries.remove(binary);
        self
    }

    /// Add a file inside the container.
    pub fn with_file(mut self, path: &str, contents: &[u8]) -> Self {
        self.files.insert(path.to_string(), contents.to_vec());
        self
    }

    fn matches(&self, reference: &str) -> bool {
        self.name == reference || (!reference.is_empty() && self.id.starts_with(reference))
    }
}

/// Fake device for manager and runner tests.
#[derive(Debug, Default)]
pub struct FakeDockerHost {
    inner: Arc<Mutex<FakeInner>>,
}

#[derive(Debug)]
struct FakeInner {
    containers: Vec<FakeContainer>,
    next_pid: u32,
    host_files: HashMap<String, Vec<u8>>,
    executed: Vec<String>,
    docker_calls: Vec<String>,
    require_sudo: bool,
    docker_on_path: bool,
    diag_words: Vec<String>,
    term_resistant: Vec<String>,
    kill_resistant: Vec<String>,
    forced: Vec<(String, CommandOutput)>,
    ignore_memory_updates: bool,
    unreachable: Option<String>,
}

impl Default for FakeInner {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            next_pid: 100,
            host_files: HashMap::new(),
            executed: Vec::new(),
            docker_calls: Vec::new(),
            require_sudo: false,
            docker_on_path: true,
            diag_words: DEFAULT_DIAG_COMMAND
                .split_whitespace()
                .map(String::from)
                .collect(),
            term_resistant: Vec::new(),
            kill_resistant: Vec::new(),
            forced: Vec::new(),
            ignore_memory_updates: false,
            unreachable: None,
        }
    }
}

impl Clone for FakeDockerHost {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl FakeDockerHost {
    /// An empty device with docker on the path and no sudo requirement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a container; its processes get fresh pids.
    pub fn add_container(&self, container: FakeContainer) {
        let mut inner = self.inner.lock().unwrap();
        let mut container = container;
        for command in std::mem::take(&mut container.commands) {
            let pid = inner.next_pid;
            inner.next_pid += 1;
            container.processes.push(FakeProcess {
                pid,
                command,
                asan_log: None,
            });
        }
        inner.containers.push(container);
    }

    /// Builder form of [`add_container`](Self::add_container).
    pub fn with_container(self, container: FakeContainer) -> Self {
        self.add_container(container);
        self
    }

    /// Docker commands fail unless prefixed with `sudo`.
    pub fn require_sudo(self) -> Self {
        self.inner.lock().unwrap().require_sudo = true;
        self
    }

    /// Docker is only reachable through the diagnostic shell.
    pub fn docker_behind_diag_shell(self) -> Self {
        self.inner.lock().unwrap().docker_on_path = false;
        self
    }

    /// Processes whose command contains `pattern` ignore TERM and INT.
    pub fn resist_term(self, pattern: &str) -> Self {
        self.inner.lock().unwrap().term_resistant.push(pattern.to_string());
        self
    }

    /// Processes whose command contains `pattern` ignore every signal.
    pub fn resist_kill(self, pattern: &str) -> Self {
        self.inner.lock().unwrap().kill_resistant.push(pattern.to_string());
        self
    }

    /// `docker update` reports success without changing anything.
    pub fn ignore_memory_updates(self) -> Self {
        self.inner.lock().unwrap().ignore_memory_updates = true;
        self
    }

    /// The device refuses connections.
    pub fn unreachable(self, reason: &str) -> Self {
        self.inner.lock().unwrap().unreachable = Some(reason.to_string());
        self
    }

    /// Commands containing `fragment` return `output` instead of being simulated.
    pub fn respond(&self, fragment: &str, output: CommandOutput) {
        let mut inner = self.inner.lock().unwrap();
        inner.forced.push((fragment.to_string(), output));
    }

    /// Raw commands received, in order.
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().unwrap().executed.clone()
    }

    /// Docker commands after unwrapping, in order.
    pub fn docker_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().docker_calls.clone()
    }

    /// Number of docker commands containing `fragment`.
    pub fn count_docker(&self, fragment: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .docker_calls
            .iter()
            .filter(|c| c.contains(fragment))
            .count()
    }

    /// Current memory limit of a container, in bytes.
    pub fn memory_limit(&self, container: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .containers
            .iter()
            .find(|c| c.matches(container))
            .map(|c| c.memory_limit)
    }

    /// `(pid, command)` of every process in a container.
    pub fn processes(&self, container: &str) -> Vec<(u32, String)> {
        let inner = self.inner.lock().unwrap();
        inner
            .containers
            .iter()
            .find(|c| c.matches(container))
            .map(|c| {
                c.processes
                    .iter()
                    .map(|p| (p.pid, p.command.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Scripts run through `sh -c` in a container (non-detached).
    pub fn scripts(&self, container: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .containers
            .iter()
            .find(|c| c.matches(container))
            .map(|c| c.scripts.clone())
            .unwrap_or_default()
    }

    /// A file inside a container.
    pub fn container_file(&self, container: &str, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .containers
            .iter()
            .find(|c| c.matches(container))
            .and_then(|c| c.files.get(path).cloned())
    }

    /// A file on the device itself.
    pub fn host_file(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().host_files.get(path).cloned()
    }
}

// ===========================================================================
// Command simulation
// ===========================================================================

impl FakeInner {
    fn handle(&mut self, raw: &str) -> CommandOutput {
        if let Some((_, output)) = self.forced.iter().find(|(f, _)| raw.contains(f.as_str())) {
            return output.clone();
        }
        let Ok(mut words) = split(raw) else {
            return CommandOutput::failed(2, "sh: syntax error: unterminated quoted string");
        };

        let n = self.diag_words.len();
        let mut via_diag = false;
        if words.len() == n + 2 && words[..n] == self.diag_words[..] && words[n] == "-c" {
            via_diag = true;
            let inner = words[n + 1].clone();
            match split(&inner) {
                Ok(w) => words = w,
                Err(_) => return CommandOutput::failed(2, "syntax error"),
            }
        } else if words == self.diag_words {
            return CommandOutput::ok("");
        }

        let mut sudo = false;
        if words.first().map(String::as_str) == Some("sudo") {
            sudo = true;
            words.remove(0);
        }

        match words.first().map(String::as_str) {
            Some("docker") => {
                if !via_diag && !self.docker_on_path {
                    return CommandOutput::failed(127, "sh: docker: command not found");
                }
                if self.require_sudo && !sudo {
                    return CommandOutput::failed(
                        1,
                        "permission denied while trying to connect to the Docker daemon socket",
                    );
                }
                self.docker_calls.push(words.join(" "));
                self.docker(&words[1..])
            }
            Some(_) => self.host_command(&words),
            None => CommandOutput::ok(""),
        }
    }

    fn host_command(&mut self, words: &[String]) -> CommandOutput {
        match words[0].as_str() {
            "true" => CommandOutput::ok(""),
            "hostname" => CommandOutput::ok("fake-device\n"),
            "uptime" => CommandOutput::ok(" 10:00:00 up 3 days,  load average: 0.10, 0.20, 0.30\n"),
            "free" => CommandOutput::ok("              total        used        free\nMem:           15Gi       4.0Gi       11Gi\n"),
            "df" => CommandOutput::ok("Filesystem      Size  Used Avail Use% Mounted on\n/dev/sda1        50G   20G   30G  40% /\n"),
            "cat" => CommandOutput::ok("NAME=\"FakeOS\"\nVERSION=\"1.0\"\n"),
            "uname" => CommandOutput::ok("Linux fake-device 5.15.0 x86_64 GNU/Linux\n"),
            "mkdir" => CommandOutput::ok(""),
            "rm" => {
                for path in words.iter().skip(1).filter(|w| !w.starts_with('-')) {
                    self.host_files.remove(path.as_str());
                }
                CommandOutput::ok("")
            }
            other => CommandOutput::failed(127, format!("sh: {}: command not found", other)),
        }
    }

    fn container_mut(&mut self, reference: &str) -> Option<&mut FakeContainer> {
        self.containers.iter_mut().find(|c| c.matches(reference))
    }

    fn no_such_container(reference: &str) -> CommandOutput {
        CommandOutput::failed(1, format!("Error: No such container: {}", reference))
    }

    fn docker(&mut self, args: &[String]) -> CommandOutput {
        let Some(sub) = args.first() else {
            return CommandOutput::failed(1, "docker: missing command");
        };
        let last = args.last().map(String::as_str).unwrap_or("");

        match sub.as_str() {
            "--version" => CommandOutput::ok("Docker version 24.0.7, build afdd53b\n"),
            "ps" => self.docker_ps(args),
            "inspect" => match self.containers.iter().find(|c| c.matches(last)) {
                Some(c) => CommandOutput::ok(format!(
                    "/{}|{}|running|2024-05-01T10:00:00Z\n",
                    c.name, c.image
                )),
                None => CommandOutput::failed(1, format!("Error: No such object: {}", last)),
            },
            "port" => match self.containers.iter().find(|c| c.matches(last)) {
                Some(c) => CommandOutput::ok(c.ports.join("\n")),
                None => Self::no_such_container(last),
            },
            "stats" => match self.containers.iter().find(|c| c.matches(last)) {
                Some(c) => {
                    let percent = c.memory_usage as f64 / c.memory_limit.max(1) as f64 * 100.0;
                    CommandOutput::ok(format!(
                        "{} / {}\t{:.2}%\t0.50%\n",
                        format_size(c.memory_usage),
                        format_size(c.memory_limit),
                        percent
                    ))
                }
                None => Self::no_such_container(last),
            },
            "update" => {
                let limit = option_value(args, "--memory").and_then(|v| MemoryLimit::parse(v).ok());
                let ignore = self.ignore_memory_updates;
                match (self.container_mut(last), limit) {
                    (Some(c), Some(limit)) => {
                        if !ignore {
                            c.memory_limit = limit.bytes();
                        }
                        CommandOutput::ok(format!("{}\n", last))
                    }
                    (None, _) => Self::no_such_container(last),
                    (_, None) => CommandOutput::failed(1, "invalid memory value"),
                }
            }
            "exec" => self.docker_exec(&args[1..]),
            "cp" => self.docker_cp(args),
            "logs" => {
                let tail = option_value(args, "--tail")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                match self.containers.iter().find(|c| c.matches(last)) {
                    Some(c) => {
                        let skip = c.logs.len().saturating_sub(tail);
                        CommandOutput::ok(c.logs[skip..].join("\n"))
                    }
                    None => Self::no_such_container(last),
                }
            }
            other => CommandOutput::failed(1, format!("docker: unknown command {}", other)),
        }
    }

    fn docker_ps(&self, args: &[String]) -> CommandOutput {
        let filter = option_value(args, "--filter").unwrap_or("");
        let (key, value) = filter.split_once('=').unwrap_or(("", ""));
        let lines: Vec<String> = self
            .containers
            .iter()
            .filter(|c| match key {
                "name" => c.name.contains(value),
                "ancestor" => c.image.contains(value),
                _ => true,
            })
            .map(|c| format!("{}\t{}\t{}\tUp 2 hours", c.id, c.name, c.image))
            .collect();
        CommandOutput::ok(lines.join("\n"))
    }

    fn docker_cp(&mut self, args: &[String]) -> CommandOutput {
        if args.len() < 3 {
            return CommandOutput::failed(1, "docker cp: requires 2 arguments");
        }
        let (src, dst) = (&args[args.len() - 2], &args[args.len() - 1]);
        if let Some((container, path)) = src.split_once(':') {
            let contents = match self.container_mut(container) {
                Some(c) => c.files.get(path).cloned(),
                None => return Self::no_such_container(container),
            };
            match contents {
                Some(data) => {
                    self.host_files.insert(dst.clone(), data);
                    CommandOutput::ok("")
                }
                None => CommandOutput::failed(
                    1,
                    format!("Error: Could not find the file {} in container {}", path, container),
                ),
            }
        } else if let Some((container, path)) = dst.split_once(':') {
            let Some(data) = self.host_files.get(src.as_str()).cloned() else {
                return CommandOutput::failed(1, format!("lstat {}: no such file or directory", src));
            };
            match self.container_mut(container) {
                Some(c) => {
                    c.files.insert(path.to_string(), data);
                    CommandOutput::ok("")
                }
                None => Self::no_such_container(container),
            }
        } else {
            CommandOutput::failed(1, "docker cp: one side must be a container path")
        }
    }

    fn docker_exec(&mut self, args: &[String]) -> CommandOutput {
        let mut detached = false;
        let mut i = 0;
        while i < args.len() && args[i].starts_with('-') {
            match args[i].as_str() {
                "-d" => detached = true,
                "-w" | "-e" | "-u" => i += 1,
                _ => {}
            }
            i += 1;
        }
        let Some(container) = args.get(i) else {
            return CommandOutput::failed(1, "docker exec: requires at least 2 arguments");
        };
        let argv: Vec<String> = args[i + 1..].to_vec();
        if self.container_mut(container).is_none() {
            return Self::no_such_container(container);
        }

        if detached {
            if argv.len() == 3 && argv[0] == "sh" && argv[1] == "-c" {
                self.spawn(container, &argv[2]);
            } else {
                self.spawn(container, &argv.join(" "));
            }
            return CommandOutput::ok("");
        }
        self.exec_in(container, &argv)
    }

    fn spawn(&mut self, container: &str, script: &str) {
        let Ok(words) = split(script) else { return };
        let mut asan_log = None;
        let mut rest: &[String] = &words;
        if let Some(first) = words.first() {
            if let Some(opts) = first.strip_prefix("ASAN_OPTIONS=") {
                asan_log = opts
                    .split(':')
                    .find_map(|kv| kv.strip_prefix("log_path="))
                    .map(String::from);
                rest = &words[1..];
            }
        }
        let Some(program) = rest.first() else { return };
        let program = basename(program).to_string();
        let pid = self.next_pid;
        let command = rest.join(" ");
        let Some(c) = self.container_mut(container) else { return };
        // sh exits with 127 in the background; nothing starts.
        if !c.binaries.contains(&program) {
            return;
        }
        c.processes.push(FakeProcess {
            pid,
            command,
            asan_log,
        });
        self.next_pid += 1;
    }

    fn exec_in(&mut self, container: &str, argv: &[String]) -> CommandOutput {
        let words: Vec<&str> = argv.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["ps", "aux"] => {
                let c = match self.container_mut(container) {
                    Some(c) => c,
                    None => return Self::no_such_container(container),
                };
                let mut out =
                    String::from("USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND\n");
                for p in &c.processes {
                    out.push_str(&format!(
                        "root {:>8}  0.5  1.2 204800 {} ?        Sl   10:00   0:01 {}\n",
                        p.pid, PROCESS_RSS_KB, p.command
                    ));
                }
                out.push_str("root      9999  0.0  0.0   7060  1580 ?        R    10:05   0:00 ps aux\n");
                CommandOutput::ok(out)
            }
            ["pgrep", "-f", pattern] => {
                let pids: Vec<String> = self
                    .container_mut(container)
                    .map(|c| {
                        c.processes
                            .iter()
                            .filter(|p| p.command.contains(pattern))
                            .map(|p| p.pid.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                if pids.is_empty() {
                    CommandOutput::failed(1, "")
                } else {
                    CommandOutput::ok(pids.join("\n") + "\n")
                }
            }
            ["ps", "-p", pid, ..] => {
                let pid: u32 = pid.parse().unwrap_or(0);
                let found = self
                    .container_mut(container)
                    .and_then(|c| c.processes.iter().find(|p| p.pid == pid).cloned());
                match found {
                    Some(p) => CommandOutput::ok(format!(
                        "{:>5}  0.5 {} {}\n",
                        p.pid, PROCESS_RSS_KB, p.command
                    )),
                    None => CommandOutput::failed(1, ""),
                }
            }
            ["kill", signal, pid] => {
                let pid: u32 = pid.parse().unwrap_or(0);
                if self.signal(container, signal, |p| p.pid == pid) == 0 {
                    CommandOutput::failed(1, format!("kill: ({}) - No such process", pid))
                } else {
                    CommandOutput::ok("")
                }
            }
            ["pkill", signal, "-f", pattern] => {
                if self.signal(container, signal, |p| p.command.contains(pattern)) == 0 {
                    CommandOutput::failed(1, "")
                } else {
                    CommandOutput::ok("")
                }
            }
            ["killall", signal, name] => {
                let matched = self.signal(container, signal, |p| {
                    p.command
                        .split_whitespace()
                        .next()
                        .map(|w| basename(w) == *name)
                        .unwrap_or(false)
                });
                if matched == 0 {
                    CommandOutput::failed(1, format!("{}: no process found", name))
                } else {
                    CommandOutput::ok("")
                }
            }
            ["which", binary] => {
                let present = self
                    .container_mut(container)
                    .map(|c| c.binaries.contains(basename(binary)))
                    .unwrap_or(false);
                if present {
                    CommandOutput::ok(format!("/usr/bin/{}\n", basename(binary)))
                } else {
                    CommandOutput::failed(1, "")
                }
            }
            ["rm", "-f", path] => {
                if let Some(c) = self.container_mut(container) {
                    c.files.remove(*path);
                }
                CommandOutput::ok("")
            }
            ["mkdir", "-p", _] | ["chmod", _, _] => CommandOutput::ok(""),
            ["cp", from, to] => {
                let Some(c) = self.container_mut(container) else {
                    return Self::no_such_container(container);
                };
                match c.files.get(*from).cloned() {
                    Some(data) => {
                        c.files.insert(to.to_string(), data);
                        CommandOutput::ok("")
                    }
                    None => CommandOutput::failed(1, format!("cp: can't stat '{}'", from)),
                }
            }
            ["sh", "-c", script] => self.run_script(container, script),
            [program, ..] => CommandOutput::failed(127, format!("exec: \"{}\": not found", program)),
            [] => CommandOutput::failed(1, "no command"),
        }
    }

    fn run_script(&mut self, container: &str, script: &str) -> CommandOutput {
        let Some(c) = self.container_mut(container) else {
            return Self::no_such_container(container);
        };
        c.scripts.push(script.to_string());

        // ASan log consolidation: `cat <path>.* > <path> ...; touch <path>`
        if let Some(target) = script.rsplit("touch ").next().filter(|_| script.starts_with("cat ")) {
            let target = target.trim().trim_matches('\'').to_string();
            let prefix = format!("{}.", target);
            let mut keys: Vec<&String> = c.files.keys().filter(|k| k.starts_with(&prefix)).collect();
            keys.sort();
            let mut merged = Vec::new();
            for key in keys {
                merged.extend_from_slice(&c.files[key]);
            }
            c.files.insert(target, merged);
        }
        CommandOutput::ok("")
    }

    /// Deliver a signal; returns how many processes matched.
    fn signal(&mut self, container: &str, signal: &str, select: impl Fn(&FakeProcess) -> bool) -> usize {
        let term_resistant = self.term_resistant.clone();
        let kill_resistant = self.kill_resistant.clone();
        let Some(c) = self.container_mut(container) else { return 0 };
        let forceful = signal == "-KILL" || signal == "-9";

        let targets: Vec<FakeProcess> = c.processes.iter().filter(|p| select(p)).cloned().collect();
        for p in &targets {
            let resists = |list: &[String]| list.iter().any(|r| p.command.contains(r.as_str()));
            if resists(&kill_resistant) || (!forceful && resists(&term_resistant)) {
                continue;
            }
            if !forceful {
                write_report(c, p);
            }
            c.processes.retain(|q| q.pid != p.pid);
        }
        targets.len()
    }
}

/// Profilers write their report when the process exits on a catchable signal.
fn write_report(container: &mut FakeContainer, process: &FakeProcess) {
    if let Some(path) = process
        .command
        .split_whitespace()
        .find_map(|w| w.strip_prefix("--xml-file="))
    {
        let report = format!(
            "<?xml version=\"1.0\"?>\n<valgrindoutput>\n  <pid>{}</pid>\n</valgrindoutput>\n",
            process.pid
        );
        container.files.insert(path.to_string(), report.into_bytes());
    }
    if let Some(path) = &process.asan_log {
        let report = format!(
            "=={}==ERROR: LeakSanitizer: detected memory leaks\n",
            process.pid
        );
        container
            .files
            .insert(format!("{}.{}", path, process.pid), report.into_bytes());
    }
}

fn option_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn format_size(bytes: u64) -> String {
    if bytes >= GIB {
        if bytes % GIB == 0 {
            format!("{}GiB", bytes / GIB)
        } else {
            format!("{:.3}GiB", bytes as f64 / GIB as f64)
        }
    } else if bytes % MIB == 0 {
        format!("{}MiB", bytes / MIB)
    } else {
        format!("{:.3}MiB", bytes as f64 / MIB as f64)
    }
}

#[async_trait]
impl RemoteShell for FakeDockerHost {
    async fn open(&self) -> Result<(), ShellError> {
        let inner = self.inner.lock().unwrap();
        match &inner.unreachable {
            Some(reason) => Err(ShellError::ConnectionFailed {
                host: "fake-device".into(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn exec(&self, command: &str, _timeout: Duration) -> Result<CommandOutput, ShellError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = &inner.unreachable {
            return Err(ShellError::ConnectionFailed {
                host: "fake-device".into(),
                reason: reason.clone(),
            });
        }
        inner.executed.push(command.to_string());
        Ok(inner.handle(command))
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        _timeout: Duration,
    ) -> Result<(), ShellError> {
        let contents = tokio::fs::read(local)
            .await
            .map_err(|e| ShellError::TransferFailed(e.to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        inner.host_files.insert(remote.to_string(), contents);
        Ok(())
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        _timeout: Duration,
    ) -> Result<(), ShellError> {
        let contents = {
            let inner = self.inner.lock().unwrap();
            inner.host_files.get(remote).cloned()
        };
        let contents = contents
            .ok_or_else(|| ShellError::TransferFailed(format!("no such remote file: {}", remote)))?;
        tokio::fs::write(local, contents)
            .await
            .map_err(|e| ShellError::TransferFailed(e.to_string()))
    }
}
