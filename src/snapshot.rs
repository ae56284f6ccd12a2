//! Disk snapshots
//!
//! Builds [`FileDescriptor`]s from the live filesystem: a full subtree for
//! root synchronisation and created directories, a single node for everything else.

use crate::error::SyncError;
use crate::event::FileDescriptor;
use crate::filter::PathFilter;
use crate::tree::path::VPath;
use crate::types::Timestamp;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Snapshots paths below a workspace root
///
/// Filtered directories are pruned from the walk so ignored trees such as
/// `target` are never descended into. Paths that disappear while being walked
/// are left out of the snapshot.
#[derive(Clone)]
pub struct DiskSnapshot {
    workspace_root: PathBuf,
    filter: Arc<dyn PathFilter>,
    read_content: bool,
}

impl DiskSnapshot {
    pub fn new(workspace_root: PathBuf, filter: Arc<dyn PathFilter>) -> Self {
        Self {
            workspace_root,
            filter,
            read_content: true,
        }
    }

    /// Leave file content out of descriptors.
    ///
    /// For use when a physical content provider reads files itself.
    pub fn without_content(mut self) -> Self {
        self.read_content = false;
        self
    }

    pub fn reads_content(&self) -> bool {
        self.read_content
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn is_allowed(&self, path: &VPath) -> bool {
        self.filter.is_allowed(path)
    }

    pub fn fs_path(&self, path: &VPath) -> PathBuf {
        if path.is_root() {
            self.workspace_root.clone()
        } else {
            self.workspace_root.join(path.as_str())
        }
    }

    /// Descriptor of `path` and everything below it; `None` when nothing exists there.
    pub fn descriptor(&self, path: &VPath) -> Result<Option<FileDescriptor>, SyncError> {
        let fs_root = self.fs_path(path);
        if std::fs::symlink_metadata(&fs_root).is_err() {
            debug!(path = %path, "Nothing on disk to snapshot");
            return Ok(None);
        }

        let walker = WalkDir::new(&fs_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || VPath::from_fs(&self.workspace_root, entry.path())
                        .map(|p| self.filter.is_allowed(&p))
                        .unwrap_or(false)
            });

        // Open directories from the walk root down to the current entry.
        let mut open: Vec<FileDescriptor> = Vec::new();
        for item in walker {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) if vanished(e.io_error()) => {
                    debug!(path = ?e.path(), "Path vanished during snapshot");
                    continue;
                }
                Err(e) => {
                    return Err(SyncError::ScanError(format!("{}: {}", fs_root.display(), e)))
                }
            };
            let depth = entry.depth();
            close_to_depth(&mut open, depth);

            if entry.file_type().is_symlink() {
                trace!(path = %entry.path().display(), "Skipping symlink");
                continue;
            }

            let vpath = match open.last() {
                Some(parent) => parent
                    .path
                    .child(&entry.file_name().to_string_lossy()),
                None => path.clone(),
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) if vanished(e.io_error()) => {
                    debug!(path = %vpath, "Path vanished during snapshot");
                    continue;
                }
                Err(e) => {
                    return Err(SyncError::ScanError(format!(
                        "{}: {}",
                        entry.path().display(),
                        e
                    )))
                }
            };
            let node = match self.snapshot_node(vpath, entry.path(), &metadata) {
                Ok(node) => node,
                Err(SyncError::ContentRead { path, source })
                    if source.kind() == ErrorKind::NotFound =>
                {
                    debug!(path = %path, "File vanished during snapshot");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if node.is_directory {
                open.push(node);
            } else if let Some(parent) = open.last_mut() {
                parent.children.push(node);
            } else {
                return Ok(Some(node));
            }
        }
        close_to_depth(&mut open, 1);
        Ok(open.pop())
    }

    /// Descriptor of `path` alone, without children.
    pub fn node(&self, path: &VPath) -> Result<Option<FileDescriptor>, SyncError> {
        let fs_path = self.fs_path(path);
        match std::fs::metadata(&fs_path) {
            Ok(metadata) => self.snapshot_node(path.clone(), &fs_path, &metadata).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn snapshot_node(
        &self,
        path: VPath,
        fs_path: &Path,
        metadata: &Metadata,
    ) -> Result<FileDescriptor, SyncError> {
        let timestamp = modified_millis(metadata);
        if metadata.is_dir() {
            return Ok(FileDescriptor::directory(path.as_str(), timestamp));
        }
        if !self.read_content {
            return Ok(FileDescriptor::file(path.as_str(), None::<Vec<u8>>, timestamp));
        }
        let content = std::fs::read(fs_path).map_err(|source| SyncError::ContentRead {
            path: path.clone(),
            source,
        })?;
        Ok(FileDescriptor::file(path.as_str(), Some(content), timestamp))
    }
}

fn vanished(error: Option<&std::io::Error>) -> bool {
    error.is_some_and(|e| e.kind() == ErrorKind::NotFound)
}

/// Pop open directories deeper than `depth - 1` into their parents.
fn close_to_depth(open: &mut Vec<FileDescriptor>, depth: usize) {
    while open.len() > depth.max(1) {
        if let Some(done) = open.pop() {
            if let Some(parent) = open.last_mut() {
                parent.children.push(done);
            }
        }
    }
}

/// Modification time in milliseconds since the epoch, when the platform reports one.
pub fn modified_millis(metadata: &Metadata) -> Option<Timestamp> {
    metadata
        .modified()
        .ok()
        .map(|time| DateTime::<Utc>::from(time).timestamp_millis())
}
