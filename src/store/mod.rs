//! Versioned Tree
//!
//! Storage surface the reconciler writes through. Every mutation is expressed as
//! an [`Operation`] and committed inside a [`Changeset`]: all operations of a
//! changeset become visible together, or none do.

pub mod memory;
pub mod persistence;
mod staging;

pub use memory::InMemoryTree;
pub use persistence::SledVersionedTree;

use crate::error::StorageError;
use crate::tree::entry::Entry;
use crate::tree::path::VPath;
use crate::types::{ChangesetId, Hash, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single mutation of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateFile {
        path: VPath,
        content: Vec<u8>,
        timestamp: Option<Timestamp>,
    },
    CreateDirectory {
        path: VPath,
        timestamp: Option<Timestamp>,
    },
    ChangeFileContent {
        path: VPath,
        content: Vec<u8>,
        timestamp: Option<Timestamp>,
    },
    /// Rename within the same parent directory
    Rename { from: VPath, to: VPath },
    /// Structural relocation, optionally re-snapshotting the content of a moved file
    Move {
        from: VPath,
        to: VPath,
        content: Option<Vec<u8>>,
    },
    /// Delete an entry and its whole subtree
    Delete { path: VPath },
    /// Set (`Some`) or clear (`None`) a tracked property
    SetProperty {
        path: VPath,
        name: String,
        value: Option<String>,
    },
}

impl Operation {
    /// Path the operation leaves an entry at (or removes one from, for deletions).
    pub fn target(&self) -> &VPath {
        match self {
            Operation::CreateFile { path, .. }
            | Operation::CreateDirectory { path, .. }
            | Operation::ChangeFileContent { path, .. }
            | Operation::Delete { path }
            | Operation::SetProperty { path, .. } => path,
            Operation::Rename { to, .. } | Operation::Move { to, .. } => to,
        }
    }
}

/// Ordered group of operations committed as one unit of history ("label")
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub label: String,
    pub operations: Vec<Operation>,
}

impl Changeset {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            operations: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Kind of a recorded change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    CreateFile,
    CreateDirectory,
    ChangeContent,
    Rename,
    Move,
    Delete,
    SetProperty,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::CreateFile => "create-file",
            ChangeKind::CreateDirectory => "create-directory",
            ChangeKind::ChangeContent => "change-content",
            ChangeKind::Rename => "rename",
            ChangeKind::Move => "move",
            ChangeKind::Delete => "delete",
            ChangeKind::SetProperty => "set-property",
        }
    }
}

/// History record of one applied operation (content is kept by hash only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedChange {
    pub kind: ChangeKind,
    pub path: VPath,
    /// Source path for renames and moves
    pub from: Option<VPath>,
    pub content_hash: Option<Hash>,
}

impl RecordedChange {
    /// True when the change touched `path` or anything below it.
    pub fn touches(&self, path: &VPath) -> bool {
        self.path.starts_with(path) || self.from.as_ref().is_some_and(|f| f.starts_with(path))
    }
}

/// A committed changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetRecord {
    pub id: ChangesetId,
    pub label: String,
    pub committed_at: DateTime<Utc>,
    pub changes: Vec<RecordedChange>,
}

impl ChangesetRecord {
    pub fn touches(&self, path: &VPath) -> bool {
        self.changes.iter().any(|change| change.touches(path))
    }
}

/// Versioned Tree interface
///
/// Implementations must make `apply` atomic and mutually exclusive with other
/// writers: readers never observe a partially applied changeset.
pub trait VersionedTree: Send + Sync {
    /// Find the entry at `path`; `None` if the tree holds nothing there.
    fn find_entry(&self, path: &VPath) -> Result<Option<Entry>, StorageError>;

    /// Validate and commit all operations of `changeset` as one history record.
    ///
    /// An empty changeset is still recorded.
    fn apply(&self, changeset: Changeset) -> Result<ChangesetId, StorageError>;

    /// Changesets touching `path` or any of its descendants, oldest first.
    fn changesets_for(&self, path: &VPath) -> Result<Vec<ChangesetRecord>, StorageError>;

    /// Paths of the direct children of `path`; for the tree root, its top-level entries.
    fn children(&self, path: &VPath) -> Result<Vec<VPath>, StorageError>;

    fn has_entry(&self, path: &VPath) -> Result<bool, StorageError> {
        Ok(self.find_entry(path)?.is_some())
    }

    fn create_file(
        &self,
        path: &VPath,
        content: &[u8],
        timestamp: Option<Timestamp>,
    ) -> Result<ChangesetId, StorageError> {
        self.apply(Changeset::new(format!("create {}", path)).with_operation(
            Operation::CreateFile {
                path: path.clone(),
                content: content.to_vec(),
                timestamp,
            },
        ))
    }

    fn create_directory(
        &self,
        path: &VPath,
        timestamp: Option<Timestamp>,
    ) -> Result<ChangesetId, StorageError> {
        self.apply(Changeset::new(format!("create {}", path)).with_operation(
            Operation::CreateDirectory {
                path: path.clone(),
                timestamp,
            },
        ))
    }

    fn change_file_content(
        &self,
        path: &VPath,
        content: &[u8],
        timestamp: Option<Timestamp>,
    ) -> Result<ChangesetId, StorageError> {
        self.apply(Changeset::new(format!("change {}", path)).with_operation(
            Operation::ChangeFileContent {
                path: path.clone(),
                content: content.to_vec(),
                timestamp,
            },
        ))
    }

    fn rename(&self, from: &VPath, to: &VPath) -> Result<ChangesetId, StorageError> {
        self.apply(Changeset::new(format!("rename {} to {}", from, to)).with_operation(
            Operation::Rename {
                from: from.clone(),
                to: to.clone(),
            },
        ))
    }

    fn move_entry(&self, from: &VPath, to: &VPath) -> Result<ChangesetId, StorageError> {
        self.apply(Changeset::new(format!("move {} to {}", from, to)).with_operation(
            Operation::Move {
                from: from.clone(),
                to: to.clone(),
                content: None,
            },
        ))
    }

    fn delete(&self, path: &VPath) -> Result<ChangesetId, StorageError> {
        self.apply(
            Changeset::new(format!("delete {}", path))
                .with_operation(Operation::Delete { path: path.clone() }),
        )
    }

    fn set_property(
        &self,
        path: &VPath,
        name: &str,
        value: Option<&str>,
    ) -> Result<ChangesetId, StorageError> {
        self.apply(Changeset::new(format!("property {} of {}", name, path)).with_operation(
            Operation::SetProperty {
                path: path.clone(),
                name: name.to_string(),
                value: value.map(str::to_string),
            },
        ))
    }
}
