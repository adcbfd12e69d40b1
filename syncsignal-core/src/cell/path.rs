//! Deep update of nested values by path
//!
//! Used by structured units to patch one member of a larger document.
//! Missing object members (and `null` parents) are created on the way down;
//! an array index may address one past the end to append.

use crate::codec::SyncValue;
use std::fmt;
use thiserror::Error;

/// One step into a nested value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, ".{}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Path rendered as `$.a[0].b`
pub fn display_path(path: &[PathSegment]) -> String {
    let mut out = String::from("$");
    for segment in path {
        out.push_str(&segment.to_string());
    }
    out
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("cannot step into {found} at {path}")]
    TypeMismatch { path: String, found: &'static str },

    #[error("index {index} out of bounds (len {len}) at {path}")]
    IndexOutOfBounds { path: String, index: usize, len: usize },
}

fn kind(value: &SyncValue) -> &'static str {
    match value {
        SyncValue::Null => "null",
        SyncValue::Bool(_) => "bool",
        SyncValue::Number(_) => "number",
        SyncValue::String(_) => "string",
        SyncValue::Array(_) => "array",
        SyncValue::Object(_) => "object",
        SyncValue::Date(_) => "date",
    }
}

/// Read the value at `path`, if every step exists
pub fn value_at_path<'a>(root: &'a SyncValue, path: &[PathSegment]) -> Option<&'a SyncValue> {
    path.iter().try_fold(root, |node, segment| match (node, segment) {
        (SyncValue::Object(map), PathSegment::Key(key)) => map.get(key),
        (SyncValue::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    })
}

fn child_mut<'a>(
    node: &'a mut SyncValue,
    segment: &PathSegment,
    walked: &[PathSegment],
) -> Result<&'a mut SyncValue, PathError> {
    match segment {
        PathSegment::Key(key) => {
            if node.is_null() {
                *node = SyncValue::object();
            }
            match node {
                SyncValue::Object(map) => Ok(map.entry(key.clone()).or_insert(SyncValue::Null)),
                other => Err(PathError::TypeMismatch {
                    path: display_path(walked),
                    found: kind(other),
                }),
            }
        }
        PathSegment::Index(index) => {
            if node.is_null() {
                *node = SyncValue::Array(Vec::new());
            }
            match node {
                SyncValue::Array(items) => {
                    let len = items.len();
                    if *index == len {
                        items.push(SyncValue::Null);
                    }
                    items.get_mut(*index).ok_or_else(|| PathError::IndexOutOfBounds {
                        path: display_path(walked),
                        index: *index,
                        len,
                    })
                }
                other => Err(PathError::TypeMismatch {
                    path: display_path(walked),
                    found: kind(other),
                }),
            }
        }
    }
}

/// Replace the value at `path` with `f(current)`
///
/// On error `root` is left untouched.
pub fn update_at_path(
    root: &mut SyncValue,
    path: &[PathSegment],
    f: impl FnOnce(&SyncValue) -> SyncValue,
) -> Result<(), PathError> {
    let mut next = root.clone();
    let mut node = &mut next;
    for (depth, segment) in path.iter().enumerate() {
        node = child_mut(node, segment, &path[..depth])?;
    }
    let replacement = f(node);
    *node = replacement;
    *root = next;
    Ok(())
}

/// Shallow merge: objects combine member-wise, anything else replaces
pub fn shallow_merge(existing: &SyncValue, incoming: SyncValue) -> SyncValue {
    match (existing, incoming) {
        (SyncValue::Object(current), SyncValue::Object(patch)) => {
            let mut merged = current.clone();
            merged.extend(patch);
            SyncValue::Object(merged)
        }
        (_, incoming) => incoming,
    }
}
