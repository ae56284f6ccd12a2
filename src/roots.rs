//! Content Root Registry
//!
//! Content roots mark the subtrees whose changes are tracked at all. The set is
//! owned by whoever manages roots (configuration, the service); the reconciler
//! only queries it.

use crate::tree::path::VPath;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Root of a tracked subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRoot {
    pub path: VPath,
    /// Logical name shown to users
    pub name: String,
}

impl ContentRoot {
    pub fn new(path: VPath, name: impl Into<String>) -> Self {
        Self {
            path,
            name: name.into(),
        }
    }

    /// Root named after its last path segment (or "workspace" for the tree root).
    pub fn at(path: impl AsRef<str>) -> Self {
        let path = VPath::new(path);
        let name = if path.is_root() {
            "workspace".to_string()
        } else {
            path.name().to_string()
        };
        Self { path, name }
    }

    pub fn contains(&self, path: &VPath) -> bool {
        path.starts_with(&self.path)
    }
}

/// Membership query over the registered content roots
pub trait ContentRoots: Send + Sync {
    /// Innermost root containing `path`.
    fn root_for(&self, path: &VPath) -> Option<ContentRoot>;

    fn is_under_content_root(&self, path: &VPath) -> bool {
        self.root_for(path).is_some()
    }
}

/// Registry of content roots, replaceable as a whole when roots change
#[derive(Debug, Default)]
pub struct ContentRootRegistry {
    roots: RwLock<Vec<ContentRoot>>,
}

impl ContentRootRegistry {
    pub fn new(roots: Vec<ContentRoot>) -> Self {
        Self {
            roots: RwLock::new(roots),
        }
    }

    /// Snapshot of the registered roots.
    pub fn roots(&self) -> Vec<ContentRoot> {
        self.roots.read().clone()
    }

    /// Replace the registered roots.
    pub fn set_roots(&self, roots: Vec<ContentRoot>) {
        *self.roots.write() = roots;
    }

    /// Roots not nested inside another registered root.
    pub fn outermost_roots(&self) -> Vec<ContentRoot> {
        let roots = self.roots.read();
        roots
            .iter()
            .filter(|root| {
                !roots
                    .iter()
                    .any(|other| other.path != root.path && root.path.starts_with(&other.path))
            })
            .cloned()
            .collect()
    }
}

impl ContentRoots for ContentRootRegistry {
    fn root_for(&self, path: &VPath) -> Option<ContentRoot> {
        self.roots
            .read()
            .iter()
            .filter(|root| root.contains(path))
            .max_by_key(|root| root.path.depth())
            .cloned()
    }
}
