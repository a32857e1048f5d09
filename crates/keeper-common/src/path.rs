//! Slash-delimited node paths
//!
//! Paths are absolute (`/a/b/c`). Empty segments are collapsed, so
//! `/a//b/` names the same node as `/a/b`. The relative segments `.` and
//! `..` are not valid node names.

use crate::ROOT;

/// Errors raised when a path cannot name a node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("path '{path}' contains invalid segment '{segment}'")]
    InvalidSegment { path: String, segment: String },
}

/// Split a path into its non-empty segments, in order.
///
/// ```
/// use keeper_common::segments;
///
/// assert_eq!(segments("/a/b/c").unwrap(), vec!["a", "b", "c"]);
/// assert_eq!(segments("/a//b/").unwrap(), vec!["a", "b"]);
/// assert!(segments("/").unwrap().is_empty());
/// assert!(segments("a/b").is_err());
/// ```
pub fn segments(path: &str) -> Result<Vec<&str>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if !path.starts_with(ROOT) {
        return Err(PathError::NotAbsolute(path.to_string()));
    }

    let mut parts = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(PathError::InvalidSegment {
                path: path.to_string(),
                segment: segment.to_string(),
            });
        }
        parts.push(segment);
    }
    Ok(parts)
}

/// Every ancestor-or-self prefix of a path, shortest first.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`. The root itself is never
/// included since it always exists.
pub fn prefixes(path: &str) -> Result<Vec<String>, PathError> {
    let parts = segments(path)?;
    let mut current = String::new();
    let mut out = Vec::with_capacity(parts.len());
    for segment in parts {
        current.push('/');
        current.push_str(segment);
        out.push(current.clone());
    }
    Ok(out)
}

/// Canonical spelling of a path: empty segments collapsed, no trailing
/// separator.
///
/// ```
/// use keeper_common::normalize;
///
/// assert_eq!(normalize("/svc//1/").unwrap(), "/svc/1");
/// assert_eq!(normalize("/").unwrap(), "/");
/// ```
pub fn normalize(path: &str) -> Result<String, PathError> {
    Ok(prefixes(path)?
        .pop()
        .unwrap_or_else(|| ROOT.to_string()))
}

/// Join a child name onto a parent path.
pub fn join(parent: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if parent.is_empty() || parent == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Parent of a path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Last segment of a path (the node's name within its parent).
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}
