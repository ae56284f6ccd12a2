//! Entries persisted by a versioned tree

use crate::tree::hasher::compute_content_hash;
use crate::tree::path::VPath;
use crate::types::{Hash, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Entry kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File { content: Vec<u8>, content_hash: Hash },
    /// Directory with the names of its current children
    Directory { children: BTreeSet<String> },
}

/// A file or directory node in the versioned tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: VPath,
    pub kind: EntryKind,
    /// `None` when the timestamp was unknown at creation
    pub timestamp: Option<Timestamp>,
    /// Tracked properties (write protection, encoding, ...)
    pub properties: BTreeMap<String, String>,
}

impl Entry {
    pub fn file(path: VPath, content: Vec<u8>, timestamp: Option<Timestamp>) -> Self {
        let content_hash = compute_content_hash(&content);
        Self {
            path,
            kind: EntryKind::File {
                content,
                content_hash,
            },
            timestamp,
            properties: BTreeMap::new(),
        }
    }

    pub fn directory(path: VPath, timestamp: Option<Timestamp>) -> Self {
        Self {
            path,
            kind: EntryKind::Directory {
                children: BTreeSet::new(),
            },
            timestamp,
            properties: BTreeMap::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    /// File content; `None` for directories.
    pub fn content(&self) -> Option<&[u8]> {
        match &self.kind {
            EntryKind::File { content, .. } => Some(content),
            EntryKind::Directory { .. } => None,
        }
    }

    pub fn content_hash(&self) -> Option<&Hash> {
        match &self.kind {
            EntryKind::File { content_hash, .. } => Some(content_hash),
            EntryKind::Directory { .. } => None,
        }
    }

    /// Child names in sorted order; empty for files.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        let names = match &self.kind {
            EntryKind::Directory { children } => Some(children),
            EntryKind::File { .. } => None,
        };
        names.into_iter().flatten().map(String::as_str)
    }

    /// Full paths of the direct children.
    pub fn child_paths(&self) -> Vec<VPath> {
        self.children().map(|name| self.path.child(name)).collect()
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Replace file content and timestamp, recomputing the content hash.
    pub(crate) fn set_content(&mut self, content: Vec<u8>, timestamp: Option<Timestamp>) {
        let content_hash = compute_content_hash(&content);
        self.kind = EntryKind::File {
            content,
            content_hash,
        };
        self.timestamp = timestamp;
    }

    pub(crate) fn add_child(&mut self, name: &str) -> bool {
        match &mut self.kind {
            EntryKind::Directory { children } => children.insert(name.to_string()),
            EntryKind::File { .. } => false,
        }
    }

    pub(crate) fn remove_child(&mut self, name: &str) -> bool {
        match &mut self.kind {
            EntryKind::Directory { children } => children.remove(name),
            EntryKind::File { .. } => false,
        }
    }
}
