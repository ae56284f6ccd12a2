//! In-memory Versioned Tree

use crate::error::StorageError;
use crate::store::staging::Staging;
use crate::store::{Changeset, ChangesetRecord, VersionedTree};
use crate::tree::entry::Entry;
use crate::tree::path::VPath;
use crate::types::ChangesetId;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<VPath, Entry>,
    history: Vec<ChangesetRecord>,
}

/// Versioned tree held entirely in memory
///
/// Used by tests and by embedders that persist snapshots themselves.
#[derive(Default)]
pub struct InMemoryTree {
    state: RwLock<MemoryState>,
}

impl InMemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently in the tree.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// All entry paths in sorted order.
    pub fn paths(&self) -> Vec<VPath> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Total number of committed changesets.
    pub fn changeset_count(&self) -> usize {
        self.state.read().history.len()
    }
}

impl VersionedTree for InMemoryTree {
    fn find_entry(&self, path: &VPath) -> Result<Option<Entry>, StorageError> {
        Ok(self.state.read().entries.get(path).cloned())
    }

    fn apply(&self, changeset: Changeset) -> Result<ChangesetId, StorageError> {
        let mut state = self.state.write();

        let mut staging = Staging::new(&state.entries);
        let mut changes = Vec::with_capacity(changeset.operations.len());
        for operation in &changeset.operations {
            changes.push(staging.apply(operation)?);
        }
        let writes = staging.into_writes();

        for (path, entry) in writes {
            match entry {
                Some(entry) => {
                    state.entries.insert(path, entry);
                }
                None => {
                    state.entries.remove(&path);
                }
            }
        }

        let id = state.history.len() as ChangesetId + 1;
        trace!(changeset = id, label = %changeset.label, operations = changes.len(), "Committed changeset");
        state.history.push(ChangesetRecord {
            id,
            label: changeset.label,
            committed_at: Utc::now(),
            changes,
        });
        Ok(id)
    }

    fn changesets_for(&self, path: &VPath) -> Result<Vec<ChangesetRecord>, StorageError> {
        Ok(self
            .state
            .read()
            .history
            .iter()
            .filter(|record| record.touches(path))
            .cloned()
            .collect())
    }

    fn children(&self, path: &VPath) -> Result<Vec<VPath>, StorageError> {
        let state = self.state.read();
        if path.is_root() {
            return Ok(state
                .entries
                .keys()
                .filter(|key| key.depth() == 1)
                .cloned()
                .collect());
        }
        Ok(state
            .entries
            .get(path)
            .map(Entry::child_paths)
            .unwrap_or_default())
    }
}
