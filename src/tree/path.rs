//! Logical tree paths
//!
//! A `VPath` is a slash-delimited identifier for a location in the versioned tree,
//! relative to the workspace root. The empty path is the tree root.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use unicode_normalization::UnicodeNormalization;

/// Slash-delimited logical path into the versioned tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VPath(String);

impl VPath {
    /// Build a path from a string, normalizing it.
    ///
    /// Unicode is normalized to NFC, backslashes become slashes, and empty
    /// segments (leading, trailing or doubled slashes) are dropped.
    pub fn new(path: impl AsRef<str>) -> Self {
        VPath(normalize_path_string(path.as_ref()))
    }

    /// The tree root.
    pub fn root() -> Self {
        VPath(String::new())
    }

    /// Convert a filesystem path under `workspace_root` into a logical path.
    pub fn from_fs(workspace_root: &Path, path: &Path) -> Result<Self, StorageError> {
        let relative = path.strip_prefix(workspace_root).map_err(|_| {
            StorageError::InvalidPath(format!(
                "{} is outside workspace {}",
                path.display(),
                workspace_root.display()
            ))
        })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_string_lossy().to_string()),
                Component::CurDir => {}
                other => {
                    return Err(StorageError::InvalidPath(format!(
                        "Unsupported path component {:?} in {}",
                        other,
                        path.display()
                    )))
                }
            }
        }
        Ok(VPath::new(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment; empty for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Parent path; `None` only for the root.
    pub fn parent(&self) -> Option<VPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(VPath(self.0[..idx].to_string())),
            None => Some(VPath::root()),
        }
    }

    pub fn child(&self, name: &str) -> VPath {
        if self.is_root() {
            VPath::new(name)
        } else {
            VPath::new(format!("{}/{}", self.0, name))
        }
    }

    /// Path with the same parent and a different last segment.
    pub fn sibling(&self, name: &str) -> VPath {
        self.parent().unwrap_or_default().child(name)
    }

    /// Component-wise prefix test; every path starts with the root and with itself.
    pub fn starts_with(&self, ancestor: &VPath) -> bool {
        if ancestor.is_root() || self == ancestor {
            return true;
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(ancestor.as_str())
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }

    /// Replace the `from` prefix of this path with `to`.
    pub fn rebase(&self, from: &VPath, to: &VPath) -> Option<VPath> {
        if !self.starts_with(from) {
            return None;
        }
        let suffix = self.0[from.0.len()..].trim_start_matches('/');
        if suffix.is_empty() {
            Some(to.clone())
        } else {
            Some(to.child(suffix))
        }
    }

    /// Number of segments; zero for the root.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// Every proper ancestor, nearest to the root first, excluding the root itself.
    pub fn ancestors(&self) -> Vec<VPath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(path) = current {
            if path.is_root() {
                break;
            }
            current = path.parent();
            out.push(path);
        }
        out.reverse();
        out
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for VPath {
    fn from(value: &str) -> Self {
        VPath::new(value)
    }
}

/// Normalize a path string without filesystem access
pub fn normalize_path_string(path: &str) -> String {
    let normalized: String = path.nfc().collect();
    normalized
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
