//! Path helpers for the coordination tree.
//!
//! Paths are absolute, `/`-separated, with no trailing separator and no
//! empty segments. The root `/` always exists and is never stored.

use crate::error::{StoreError, StoreResult};

pub const ROOT: &str = "/";

/// Check that `path` is a well-formed absolute path.
pub fn validate(path: &str) -> StoreResult<()> {
    if path == ROOT {
        return Ok(());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(StoreError::InvalidPath(path.to_string()));
    };
    if rest.split('/').any(|segment| segment.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of `path`.
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Append a single segment to `parent`.
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Key prefix shared by every descendant of `path`.
pub fn child_prefix(path: &str) -> String {
    if path == ROOT {
        ROOT.to_string()
    } else {
        format!("{path}/")
    }
}

/// Proper ancestors of `path` (root excluded), outermost first.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p == ROOT {
            break;
        }
        out.push(p);
        current = parent(p);
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_well_formed_paths() {
        assert!(validate("/").is_ok());
        assert!(validate("/storm").is_ok());
        assert!(validate("/storm/assignments/topo-1").is_ok());
    }

    #[test]
    fn validate_rejects_malformed_paths() {
        assert!(validate("").is_err());
        assert!(validate("storm").is_err());
        assert!(validate("/storm/").is_err());
        assert!(validate("/storm//x").is_err());
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent("/storm/storms/t1"), Some("/storm/storms"));
        assert_eq!(parent("/storm"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(name("/storm/storms/t1"), "t1");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("/", "storm"), "/storm");
        assert_eq!(join("/storm", "errors"), "/storm/errors");
    }

    #[test]
    fn ancestors_outermost_first() {
        assert_eq!(
            ancestors("/storm/workerbeats/t1/node-6700"),
            vec!["/storm", "/storm/workerbeats", "/storm/workerbeats/t1"]
        );
        assert!(ancestors("/storm").is_empty());
    }
}
