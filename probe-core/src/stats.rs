//! Parsers for `docker ps`, `docker stats` and `docker inspect` output.
//!
//! Each parser expects the format string from [`crate::command::docker`].

use probe_types::{Container, ContainerStats, MemoryLimit, MemoryLimitError};
use thiserror::Error;

/// Error parsing container tooling output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsParseError {
    /// Output had no data line.
    #[error("empty output")]
    Empty,
    /// A line had the wrong number of fields.
    #[error("malformed line: {0}")]
    Malformed(String),
    /// A size could not be parsed.
    #[error("invalid size: {0}")]
    Size(#[from] MemoryLimitError),
    /// A percentage could not be parsed.
    #[error("invalid percentage: {0}")]
    Percent(String),
}

fn split_fields(line: &str) -> Vec<&str> {
    // Format strings sent through some shells arrive with literal `\t`.
    if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        line.split("\\t").map(str::trim).collect()
    }
}

fn percent(field: &str) -> Result<f64, StatsParseError> {
    field
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| StatsParseError::Percent(field.to_string()))
}

/// Parse `docker stats --no-stream` output.
///
/// A `MEM USAGE / LIMIT` header, if present, is skipped.
pub fn parse_stats(output: &str) -> Result<ContainerStats, StatsParseError> {
    let line = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| !l.to_ascii_uppercase().starts_with("MEM USAGE"))
        .ok_or(StatsParseError::Empty)?;

    let fields = split_fields(line);
    if fields.len() < 3 {
        return Err(StatsParseError::Malformed(line.to_string()));
    }
    let (usage, limit) = fields[0]
        .split_once('/')
        .ok_or_else(|| StatsParseError::Malformed(line.to_string()))?;

    Ok(ContainerStats {
        memory_usage: MemoryLimit::parse(usage)?,
        memory_limit: MemoryLimit::parse(limit)?,
        memory_percent: percent(fields[1])?,
        cpu_percent: percent(fields[2])?,
    })
}

/// Parse one `docker ps` line (id, name, image, status).
pub fn parse_ps_line(line: &str) -> Option<Container> {
    let line = line.trim();
    if line.is_empty() || line.to_ascii_uppercase().starts_with("CONTAINER ID") {
        return None;
    }
    let fields = split_fields(line);
    if fields.len() < 4 || fields[0].is_empty() {
        return None;
    }
    Some(Container::new(fields[0], fields[1], fields[2], fields[3]))
}

/// Parse `docker inspect` output in `name|image|status|created` form.
///
/// Returns `(name, image, status, created)`; the leading `/` docker puts on
/// names is removed.
pub fn parse_inspect_line(output: &str) -> Option<(String, String, String, String)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut parts = line.splitn(4, '|');
    let name = parts.next()?.trim_start_matches('/').to_string();
    let image = parts.next()?.to_string();
    let status = parts.next()?.to_string();
    let created = parts.next()?.to_string();
    Some((name, image, status, created))
}
