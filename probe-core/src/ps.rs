//! Parsers for `ps` and `pgrep` output.
//!
//! Containers ship either procps (`USER PID %CPU %MEM VSZ RSS ... COMMAND`)
//! or busybox (`PID USER TIME COMMAND`). The header line decides the layout;
//! without one, procps is assumed.

/// One row of process listing output.
#[derive(Debug, Clone, PartialEq)]
pub struct PsEntry {
    /// Process id.
    pub pid: u32,
    /// Owner, when listed.
    pub user: Option<String>,
    /// CPU percent (0 when not listed).
    pub cpu_percent: f64,
    /// Resident set size in KB (0 when not listed).
    pub rss_kb: u64,
    /// Full command line.
    pub command: String,
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    pid: usize,
    user: Option<usize>,
    cpu: Option<usize>,
    rss: Option<usize>,
    command: usize,
}

const PROCPS: Layout = Layout {
    user: Some(0),
    pid: 1,
    cpu: Some(2),
    rss: Some(5),
    command: 10,
};

fn layout_from_header(line: &str) -> Option<Layout> {
    let cols: Vec<String> = line
        .split_whitespace()
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let find = |names: &[&str]| cols.iter().position(|c| names.contains(&c.as_str()));
    let pid = find(&["PID"])?;
    let command = find(&["COMMAND", "CMD", "ARGS"])?;
    Some(Layout {
        pid,
        user: find(&["USER", "UID"]),
        cpu: find(&["%CPU"]),
        rss: find(&["RSS"]),
        command,
    })
}

/// Parse `ps aux` (or busybox `ps`) output.
///
/// Lines that do not fit the layout are skipped.
pub fn parse_ps(output: &str) -> Vec<PsEntry> {
    let mut layout = PROCPS;
    let mut entries = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(header) = layout_from_header(trimmed) {
            layout = header;
            continue;
        }
        if let Some(entry) = parse_row(trimmed, layout) {
            entries.push(entry);
        }
    }
    entries
}

fn parse_row(line: &str, layout: Layout) -> Option<PsEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= layout.command {
        return None;
    }
    let pid = fields.get(layout.pid)?.parse().ok()?;
    let number = |idx: Option<usize>| idx.and_then(|i| fields.get(i)).and_then(|s| s.parse().ok());
    Some(PsEntry {
        pid,
        user: layout.user.and_then(|i| fields.get(i)).map(|s| s.to_string()),
        cpu_percent: number(layout.cpu).unwrap_or(0.0),
        rss_kb: layout
            .rss
            .and_then(|i| fields.get(i))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        command: fields[layout.command..].join(" "),
    })
}

/// Parse `ps -p <pid> -o pid,pcpu,rss,args --no-headers` output.
pub fn parse_ps_pid(output: &str) -> Option<PsEntry> {
    let layout = Layout {
        pid: 0,
        user: None,
        cpu: Some(1),
        rss: Some(2),
        command: 3,
    };
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find_map(|l| parse_row(l, layout))
}

/// Parse `pgrep` output: one pid per line.
pub fn parse_pgrep(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect()
}
