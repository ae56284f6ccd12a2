//! Structural validation and application of operations over a staged overlay.
//!
//! Both tree backends stage a changeset here first and only persist the
//! resulting writes when every operation applied cleanly.

use crate::error::StorageError;
use crate::store::{ChangeKind, Operation, RecordedChange};
use crate::tree::entry::Entry;
use crate::tree::path::VPath;
use crate::types::Hash;
use std::collections::BTreeMap;

/// Read access to committed entries
pub(crate) trait EntryTable {
    fn load(&self, path: &VPath) -> Result<Option<Entry>, StorageError>;
}

impl EntryTable for BTreeMap<VPath, Entry> {
    fn load(&self, path: &VPath) -> Result<Option<Entry>, StorageError> {
        Ok(self.get(path).cloned())
    }
}

/// Pending writes: `Some` puts an entry, `None` removes it
pub(crate) type Writes = BTreeMap<VPath, Option<Entry>>;

pub(crate) struct Staging<'a, T: EntryTable + ?Sized> {
    table: &'a T,
    overlay: Writes,
}

impl<'a, T: EntryTable + ?Sized> Staging<'a, T> {
    pub(crate) fn new(table: &'a T) -> Self {
        Self {
            table,
            overlay: BTreeMap::new(),
        }
    }

    pub(crate) fn into_writes(self) -> Writes {
        self.overlay
    }

    /// Apply one operation to the overlay.
    pub(crate) fn apply(&mut self, operation: &Operation) -> Result<RecordedChange, StorageError> {
        match operation {
            Operation::CreateFile {
                path,
                content,
                timestamp,
            } => {
                let entry = Entry::file(path.clone(), content.clone(), *timestamp);
                let content_hash = entry.content_hash().copied();
                self.insert_new(entry)?;
                Ok(change(ChangeKind::CreateFile, path, None, content_hash))
            }
            Operation::CreateDirectory { path, timestamp } => {
                self.insert_new(Entry::directory(path.clone(), *timestamp))?;
                Ok(change(ChangeKind::CreateDirectory, path, None, None))
            }
            Operation::ChangeFileContent {
                path,
                content,
                timestamp,
            } => {
                let mut entry = self.require(path)?;
                if entry.is_directory() {
                    return Err(StorageError::NotAFile(path.clone()));
                }
                entry.set_content(content.clone(), *timestamp);
                let content_hash = entry.content_hash().copied();
                self.put(entry);
                Ok(change(ChangeKind::ChangeContent, path, None, content_hash))
            }
            Operation::Rename { from, to } => {
                if from.parent() != to.parent() {
                    return Err(StorageError::InvalidMove {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
                self.relocate(from, to, None)?;
                Ok(change(ChangeKind::Rename, to, Some(from), None))
            }
            Operation::Move { from, to, content } => {
                let content_hash = self.relocate(from, to, content.clone())?;
                Ok(change(ChangeKind::Move, to, Some(from), content_hash))
            }
            Operation::Delete { path } => {
                let subtree = self.subtree(path)?;
                self.unlink(path)?;
                for entry in subtree {
                    self.remove(&entry.path);
                }
                Ok(change(ChangeKind::Delete, path, None, None))
            }
            Operation::SetProperty { path, name, value } => {
                let mut entry = self.require(path)?;
                match value {
                    Some(value) => {
                        entry.properties.insert(name.clone(), value.clone());
                    }
                    None => {
                        entry.properties.remove(name);
                    }
                }
                self.put(entry);
                Ok(change(ChangeKind::SetProperty, path, None, None))
            }
        }
    }

    fn get(&self, path: &VPath) -> Result<Option<Entry>, StorageError> {
        match self.overlay.get(path) {
            Some(staged) => Ok(staged.clone()),
            None => self.table.load(path),
        }
    }

    fn require(&self, path: &VPath) -> Result<Entry, StorageError> {
        self.get(path)?
            .ok_or_else(|| StorageError::EntryNotFound(path.clone()))
    }

    fn put(&mut self, entry: Entry) {
        self.overlay.insert(entry.path.clone(), Some(entry));
    }

    fn remove(&mut self, path: &VPath) {
        self.overlay.insert(path.clone(), None);
    }

    /// Directory that holds `path`; `None` when the parent is the tree root.
    fn parent_directory(&self, path: &VPath) -> Result<Option<Entry>, StorageError> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidPath("the tree root has no entry".to_string()))?;
        if parent.is_root() {
            return Ok(None);
        }
        match self.get(&parent)? {
            Some(entry) if entry.is_directory() => Ok(Some(entry)),
            Some(_) => Err(StorageError::NotADirectory(parent)),
            None => Err(StorageError::ParentNotFound(path.clone())),
        }
    }

    fn link(&mut self, path: &VPath) -> Result<(), StorageError> {
        if let Some(mut parent) = self.parent_directory(path)? {
            parent.add_child(path.name());
            self.put(parent);
        }
        Ok(())
    }

    fn unlink(&mut self, path: &VPath) -> Result<(), StorageError> {
        if let Some(mut parent) = self.parent_directory(path)? {
            parent.remove_child(path.name());
            self.put(parent);
        }
        Ok(())
    }

    fn insert_new(&mut self, entry: Entry) -> Result<(), StorageError> {
        if self.get(&entry.path)?.is_some() {
            return Err(StorageError::EntryExists(entry.path));
        }
        self.link(&entry.path)?;
        self.put(entry);
        Ok(())
    }

    /// `root` and all its descendants, parents before children.
    fn subtree(&self, root: &VPath) -> Result<Vec<Entry>, StorageError> {
        let mut out = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(path) = pending.pop() {
            let entry = self.require(&path)?;
            pending.extend(entry.child_paths().into_iter().rev());
            out.push(entry);
        }
        Ok(out)
    }

    fn relocate(
        &mut self,
        from: &VPath,
        to: &VPath,
        content: Option<Vec<u8>>,
    ) -> Result<Option<Hash>, StorageError> {
        if from.is_root() || to.starts_with(from) {
            return Err(StorageError::InvalidMove {
                from: from.clone(),
                to: to.clone(),
            });
        }
        let subtree = self.subtree(from)?;
        if self.get(to)?.is_some() {
            return Err(StorageError::EntryExists(to.clone()));
        }
        self.parent_directory(to)?;

        self.unlink(from)?;
        for entry in &subtree {
            self.remove(&entry.path);
        }

        let mut content_hash = None;
        for mut entry in subtree {
            let relocated = entry.path.rebase(from, to).ok_or_else(|| {
                StorageError::InvalidMove {
                    from: from.clone(),
                    to: to.clone(),
                }
            })?;
            if relocated == *to {
                if let Some(content) = content.clone() {
                    if entry.is_directory() {
                        return Err(StorageError::NotAFile(from.clone()));
                    }
                    let timestamp = entry.timestamp;
                    entry.set_content(content, timestamp);
                }
                content_hash = entry.content_hash().copied();
            }
            entry.path = relocated;
            self.put(entry);
        }
        self.link(to)?;
        Ok(content_hash)
    }
}

fn change(
    kind: ChangeKind,
    path: &VPath,
    from: Option<&VPath>,
    content_hash: Option<Hash>,
) -> RecordedChange {
    RecordedChange {
        kind,
        path: path.clone(),
        from: from.cloned(),
        content_hash,
    }
}
