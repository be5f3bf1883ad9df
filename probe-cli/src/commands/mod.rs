//! CLI command implementations.

pub mod check;
pub mod discover;
pub mod list;
pub mod run;

/// Display form of a scenario's container reference.
pub fn container_label(container_id: &str) -> &str {
    if container_id.is_empty() {
        "(auto)"
    } else {
        container_id
    }
}
