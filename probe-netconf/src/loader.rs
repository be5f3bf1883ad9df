//! Load RPC operations from XML files.

use crate::error::NetconfError;
use crate::framing::strip_xml_declaration;
use probe_types::RpcOperation;
use std::path::Path;
use tracing::{info, warn};

/// Load one operation. The name is the payload's root element, or the file
/// stem when no root element can be found.
pub fn load_rpc_file(path: &Path) -> Result<RpcOperation, NetconfError> {
    let payload = std::fs::read_to_string(path).map_err(|source| NetconfError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let name = root_element(&payload)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "rpc".to_string());

    let mut op = RpcOperation::new(&name, &payload);
    op.description = format!("Loaded from {}", path.display());
    Ok(op)
}

/// Load every `*.xml` file in `dir`, sorted by file name.
///
/// A missing directory yields no operations; unreadable files are skipped.
pub fn load_rpc_directory(dir: &Path) -> Result<Vec<RpcOperation>, NetconfError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "RPC directory does not exist");
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| NetconfError::Load {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "xml").unwrap_or(false))
        .collect();
    files.sort();

    let mut operations = Vec::with_capacity(files.len());
    for file in files {
        match load_rpc_file(&file) {
            Ok(op) => {
                info!(name = %op.name, file = %file.display(), "loaded RPC operation");
                operations.push(op);
            }
            Err(e) => warn!(file = %file.display(), error = %e, "skipping RPC file"),
        }
    }
    Ok(operations)
}

/// Local name of the first element, skipping declarations and comments.
fn root_element(xml: &str) -> Option<String> {
    let mut rest = strip_xml_declaration(xml);
    loop {
        let start = rest.find('<')?;
        rest = &rest[start..];
        if rest.starts_with("<!--") {
            let end = rest.find("-->")?;
            rest = &rest[end + 3..];
        } else if rest.starts_with("<?") || rest.starts_with("<!") {
            let end = rest.find('>')?;
            rest = &rest[end + 1..];
        } else {
            break;
        }
    }
    let tag: String = rest[1..]
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
        .collect();
    let local = tag.rsplit(':').next().unwrap_or(&tag);
    if local.is_empty() {
        None
    } else {
        Some(local.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_element_names() {
        assert_eq!(root_element("<get-config><source/></get-config>").as_deref(), Some("get-config"));
        assert_eq!(
            root_element("<?xml version=\"1.0\"?>\n<!-- load -->\n<nc:get xmlns:nc=\"x\"/>").as_deref(),
            Some("get")
        );
        assert_eq!(root_element("no markup"), None);
        assert_eq!(root_element("< >"), None);
    }

    #[test]
    fn name_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain-text.xml");
        std::fs::write(&path, "just text").unwrap();
        let op = load_rpc_file(&path).unwrap();
        assert_eq!(op.name, "plain-text");
        assert_eq!(op.repeat_count, 1);
    }

    #[test]
    fn directory_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.xml"), "<lock/>").unwrap();
        std::fs::write(dir.path().join("a.xml"), "<get/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "<ignored/>").unwrap();

        let ops = load_rpc_directory(dir.path()).unwrap();
        let names: Vec<_> = ops.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["get", "lock"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let ops = load_rpc_directory(Path::new("/definitely/not/here")).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_rpc_file(Path::new("/definitely/not/here.xml")).unwrap_err();
        assert!(matches!(err, NetconfError::Load { .. }));
    }
}
