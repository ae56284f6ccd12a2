//! Change Reconciler
//!
//! Turns raw filesystem events into changesets against the versioned tree.
//! Every event passes two independent scope checks, the path filter and the
//! content roots, before anything is written. One notification yields at most
//! one changeset.
//!
//! Scope exclusions, stale references and structural conflicts are absorbed and
//! logged at `debug`. Storage and content-read failures propagate.

use crate::content::ContentSource;
use crate::error::SyncError;
use crate::event::{FileDescriptor, FileEventListener, FsEvent};
use crate::filter::PathFilter;
use crate::roots::ContentRoots;
use crate::store::{Changeset, Operation, VersionedTree};
use crate::tree::hasher::compute_content_hash;
use crate::tree::path::VPath;
use crate::types::ChangesetId;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Properties recorded when no allow-list is configured.
pub const DEFAULT_TRACKED_PROPERTIES: &[&str] = &["writable", "encoding"];

/// Counts of the operations a root synchronisation committed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncReport {
    fn from_operations(operations: &[Operation]) -> Self {
        let mut report = SyncReport::default();
        for operation in operations {
            match operation {
                Operation::CreateFile { .. } | Operation::CreateDirectory { .. } => {
                    report.created += 1
                }
                Operation::ChangeFileContent { .. } => report.updated += 1,
                Operation::Delete { .. } => report.deleted += 1,
                _ => {}
            }
        }
        report
    }

    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Event-driven writer of the versioned tree
pub struct Reconciler {
    tree: Arc<dyn VersionedTree>,
    filter: Arc<dyn PathFilter>,
    roots: Arc<dyn ContentRoots>,
    content: Arc<ContentSource>,
    tracked_properties: HashSet<String>,
}

impl Reconciler {
    pub fn new(
        tree: Arc<dyn VersionedTree>,
        filter: Arc<dyn PathFilter>,
        roots: Arc<dyn ContentRoots>,
        content: Arc<ContentSource>,
    ) -> Self {
        Self::with_tracked_properties(
            tree,
            filter,
            roots,
            content,
            DEFAULT_TRACKED_PROPERTIES.iter().copied(),
        )
    }

    pub fn with_tracked_properties(
        tree: Arc<dyn VersionedTree>,
        filter: Arc<dyn PathFilter>,
        roots: Arc<dyn ContentRoots>,
        content: Arc<ContentSource>,
        tracked_properties: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            tree,
            filter,
            roots,
            content,
            tracked_properties: tracked_properties.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tree(&self) -> &Arc<dyn VersionedTree> {
        &self.tree
    }

    pub fn content(&self) -> &Arc<ContentSource> {
        &self.content
    }

    pub fn tracks_property(&self, property: &str) -> bool {
        self.tracked_properties.contains(property)
    }

    /// Allowed by the filter and inside a content root. The tree root itself never is.
    fn in_scope(&self, path: &VPath) -> bool {
        !path.is_root() && self.filter.is_allowed(path) && self.roots.is_under_content_root(path)
    }

    pub fn on_created(&self, descriptor: &FileDescriptor) -> Result<(), SyncError> {
        let path = &descriptor.path;
        if !self.in_scope(path) {
            debug!(path = %path, "Created path out of scope");
            return Ok(());
        }
        if self.tree.has_entry(path)? {
            debug!(path = %path, "Created path already tracked");
            return Ok(());
        }

        let mut changeset = Changeset::new(format!("create {}", path));
        self.materialize(descriptor, &mut changeset)?;
        self.commit(changeset)?;
        Ok(())
    }

    pub fn on_content_changed(&self, descriptor: &FileDescriptor) -> Result<(), SyncError> {
        let path = &descriptor.path;
        if !self.in_scope(path) {
            debug!(path = %path, "Changed path out of scope");
            return Ok(());
        }
        match self.tree.find_entry(path)? {
            None => {
                debug!(path = %path, "Content change for untracked path");
                Ok(())
            }
            Some(entry) if entry.is_directory() => {
                debug!(path = %path, "Content change for a directory");
                Ok(())
            }
            Some(_) => {
                let content = self.content.resolve(descriptor)?;
                self.commit(Changeset::new(format!("change {}", path)).with_operation(
                    Operation::ChangeFileContent {
                        path: path.clone(),
                        content,
                        timestamp: descriptor.timestamp,
                    },
                ))?;
                Ok(())
            }
        }
    }

    /// `descriptor` carries the new path; the old one is its sibling named `old_name`.
    pub fn on_renamed(&self, descriptor: &FileDescriptor, old_name: &str) -> Result<(), SyncError> {
        let new_path = &descriptor.path;
        if new_path.is_root() || !is_plain_name(old_name) {
            debug!(path = %new_path, old_name, "Rename with a malformed name");
            return Ok(());
        }
        let old_path = new_path.sibling(old_name);

        if !self.in_scope(new_path) {
            if self.tree.has_entry(&old_path)? {
                debug!(from = %old_path, to = %new_path, "Renamed out of scope, dropping entry");
                self.commit(
                    Changeset::new(format!("delete {}", old_path))
                        .with_operation(Operation::Delete { path: old_path }),
                )?;
            }
            return Ok(());
        }
        if !self.tree.has_entry(&old_path)? {
            debug!(from = %old_path, "Rename of untracked path");
            return Ok(());
        }

        self.commit(
            Changeset::new(format!("rename {} to {}", old_path, new_path)).with_operation(
                Operation::Rename {
                    from: old_path,
                    to: new_path.clone(),
                },
            ),
        )?;
        Ok(())
    }

    /// Scope is decided per endpoint: a move across a scope boundary becomes a
    /// delete or a create, never a move.
    pub fn on_moved(
        &self,
        descriptor: &FileDescriptor,
        old_parent: &FileDescriptor,
        new_parent: &FileDescriptor,
    ) -> Result<(), SyncError> {
        let name = descriptor.name();
        if !is_plain_name(name) {
            debug!(from = %old_parent.path, to = %new_parent.path, "Move with a malformed name");
            return Ok(());
        }
        let old_path = old_parent.path.child(name);
        let new_path = new_parent.path.child(name);

        let src_allowed = self.filter.is_allowed(&old_path)
            && self.roots.is_under_content_root(&old_parent.path);
        let dst_allowed = self.filter.is_allowed(&new_path)
            && self.roots.is_under_content_root(&new_parent.path);

        match (src_allowed, dst_allowed) {
            (true, true) => {
                if !self.tree.has_entry(&old_path)? {
                    debug!(from = %old_path, "Move of untracked path");
                    return Ok(());
                }
                self.commit(
                    Changeset::new(format!("move {} to {}", old_path, new_path)).with_operation(
                        Operation::Move {
                            from: old_path,
                            to: new_path,
                            content: None,
                        },
                    ),
                )?;
            }
            (true, false) => {
                if self.tree.has_entry(&old_path)? {
                    debug!(from = %old_path, to = %new_path, "Moved out of scope, dropping entry");
                    self.commit(
                        Changeset::new(format!("delete {}", old_path))
                            .with_operation(Operation::Delete { path: old_path }),
                    )?;
                }
            }
            (false, true) => {
                if self.tree.has_entry(&new_path)? {
                    debug!(to = %new_path, "Moved into scope onto a tracked path");
                    return Ok(());
                }
                debug!(from = %old_path, to = %new_path, "Moved into scope, creating entry");
                let relocated = descriptor.relocated(new_path.clone());
                let mut changeset = Changeset::new(format!("create {}", new_path));
                self.materialize(&relocated, &mut changeset)?;
                self.commit(changeset)?;
            }
            (false, false) => {
                debug!(from = %old_path, to = %new_path, "Move outside scope");
            }
        }
        Ok(())
    }

    /// With a parent the deleted path is `parent/name`, otherwise the descriptor's own path.
    pub fn on_deleted(
        &self,
        descriptor: &FileDescriptor,
        parent: Option<&FileDescriptor>,
    ) -> Result<(), SyncError> {
        let path = match parent {
            Some(parent) if !is_plain_name(descriptor.name()) => {
                debug!(parent = %parent.path, "Deletion with a malformed name");
                return Ok(());
            }
            Some(parent) => parent.path.child(descriptor.name()),
            None => descriptor.path.clone(),
        };
        if path.is_root() || !self.tree.has_entry(&path)? {
            debug!(path = %path, "Deletion of untracked path");
            return Ok(());
        }
        self.commit(
            Changeset::new(format!("delete {}", path)).with_operation(Operation::Delete { path }),
        )?;
        Ok(())
    }

    pub fn on_property_changed(
        &self,
        descriptor: &FileDescriptor,
        property: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<(), SyncError> {
        let path = &descriptor.path;
        if !self.tracks_property(property) {
            trace!(path = %path, property, "Ignoring untracked property");
            return Ok(());
        }
        if !self.in_scope(path) || !self.tree.has_entry(path)? {
            debug!(path = %path, property, "Property change for untracked path");
            return Ok(());
        }
        debug!(path = %path, property, ?old_value, ?new_value, "Recording property change");
        self.commit(
            Changeset::new(format!("property {} of {}", property, path)).with_operation(
                Operation::SetProperty {
                    path: path.clone(),
                    name: property.to_string(),
                    value: new_value.map(str::to_string),
                },
            ),
        )?;
        Ok(())
    }

    /// Bring the tree in line with a full snapshot of a content root, in one changeset.
    ///
    /// Missing ancestors of the root are created as directories. Entries missing
    /// from the snapshot, or no longer in scope, are deleted. Nothing is committed
    /// when the tree already matches.
    pub fn synchronize_root(&self, descriptor: &FileDescriptor) -> Result<SyncReport, SyncError> {
        let root = &descriptor.path;
        if !root.is_root() && !self.in_scope(root) {
            debug!(root = %root, "Content root out of scope");
            return Ok(SyncReport::default());
        }

        let mut changeset = Changeset::new(format!("synchronize {}", root));
        for ancestor in root.ancestors() {
            match self.tree.find_entry(&ancestor)? {
                Some(entry) if entry.is_directory() => {}
                Some(_) => {
                    debug!(root = %root, ancestor = %ancestor, "Content root ancestor is a file");
                    return Ok(SyncReport::default());
                }
                None => changeset.push(Operation::CreateDirectory {
                    path: ancestor,
                    timestamp: None,
                }),
            }
        }

        let mut pending = vec![descriptor];
        while let Some(node) = pending.pop() {
            if !node.path.is_root() {
                match self.tree.find_entry(&node.path)? {
                    None => {
                        self.materialize(node, &mut changeset)?;
                        continue;
                    }
                    Some(entry) if entry.is_directory() != node.is_directory => {
                        changeset.push(Operation::Delete {
                            path: node.path.clone(),
                        });
                        self.materialize(node, &mut changeset)?;
                        continue;
                    }
                    Some(entry) if !entry.is_directory() => {
                        let content = self.content.resolve(node)?;
                        if entry.content_hash() != Some(&compute_content_hash(&content)) {
                            changeset.push(Operation::ChangeFileContent {
                                path: node.path.clone(),
                                content,
                                timestamp: node.timestamp,
                            });
                        }
                        continue;
                    }
                    Some(_) => {}
                }
            }

            // Directory on both sides: drop what vanished, then descend.
            let present: HashSet<&str> = node
                .children
                .iter()
                .filter(|child| self.in_scope(&child.path))
                .map(|child| child.name())
                .collect();
            for tracked in self.tree.children(&node.path)? {
                if !present.contains(tracked.name()) {
                    changeset.push(Operation::Delete { path: tracked });
                }
            }
            pending.extend(
                node.children
                    .iter()
                    .rev()
                    .filter(|child| self.in_scope(&child.path)),
            );
        }

        if changeset.is_empty() {
            debug!(root = %root, "Content root already in sync");
            return Ok(SyncReport::default());
        }
        let report = SyncReport::from_operations(&changeset.operations);
        match self.commit(changeset)? {
            Some(_) => {
                info!(
                    root = %root,
                    created = report.created,
                    updated = report.updated,
                    deleted = report.deleted,
                    "Synchronized content root"
                );
                Ok(report)
            }
            None => Ok(SyncReport::default()),
        }
    }

    /// Queue creation of `descriptor` and its in-scope descendants, parents first.
    fn materialize(
        &self,
        descriptor: &FileDescriptor,
        changeset: &mut Changeset,
    ) -> Result<(), SyncError> {
        let mut pending = vec![descriptor];
        while let Some(node) = pending.pop() {
            if node.is_directory {
                changeset.push(Operation::CreateDirectory {
                    path: node.path.clone(),
                    timestamp: node.timestamp,
                });
                for child in node.children.iter().rev() {
                    if self.in_scope(&child.path) {
                        pending.push(child);
                    } else {
                        trace!(path = %child.path, "Skipping out-of-scope child");
                    }
                }
            } else {
                let content = self.content.resolve(node)?;
                changeset.push(Operation::CreateFile {
                    path: node.path.clone(),
                    content,
                    timestamp: node.timestamp,
                });
            }
        }
        Ok(())
    }

    /// Apply `changeset`; structural conflicts are absorbed and yield `None`.
    fn commit(&self, changeset: Changeset) -> Result<Option<ChangesetId>, SyncError> {
        let label = changeset.label.clone();
        let operations = changeset.len();
        match self.tree.apply(changeset) {
            Ok(id) => {
                debug!(changeset = id, label = %label, operations, "Applied changeset");
                Ok(Some(id))
            }
            Err(err) if err.is_structural() => {
                debug!(label = %label, error = %err, "Absorbed structural conflict");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// A single path component. Anything else would resolve to some other entry.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

impl FileEventListener for Reconciler {
    fn handle(&self, event: &FsEvent) -> Result<(), SyncError> {
        trace!(kind = event.kind(), path = %event.subject().path, "Reconciling event");
        match event {
            FsEvent::Created(descriptor) => self.on_created(descriptor),
            FsEvent::ContentChanged(descriptor) => self.on_content_changed(descriptor),
            FsEvent::Renamed {
                descriptor,
                old_name,
            } => self.on_renamed(descriptor, old_name),
            FsEvent::Moved {
                descriptor,
                old_parent,
                new_parent,
            } => self.on_moved(descriptor, old_parent, new_parent),
            FsEvent::Deleted { descriptor, parent } => {
                self.on_deleted(descriptor, parent.as_ref())
            }
            FsEvent::PropertyChanged {
                descriptor,
                property,
                old_value,
                new_value,
            } => self.on_property_changed(
                descriptor,
                property,
                old_value.as_deref(),
                new_value.as_deref(),
            ),
        }
    }
}
