//! Watch Mode Daemon
//!
//! Long-lived loop that turns `notify` filesystem events into [`FsEvent`]s and
//! fires them on an [`EventBus`]. Descriptors are snapshotted from disk when the
//! batch is processed, so they reflect the state at delivery time.

use crate::error::SyncError;
use crate::event::{EventBus, FileDescriptor, FsEvent};
use crate::snapshot::DiskSnapshot;
use crate::tree::path::VPath;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Property reported for permission changes.
pub const WRITABLE_PROPERTY: &str = "writable";

/// Watch mode configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Workspace root directory
    pub workspace_root: PathBuf,
    /// Batch window in milliseconds
    pub batch_window_ms: u64,
    /// Maximum events per batch
    pub max_batch_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            batch_window_ms: 50,
            max_batch_size: 100,
        }
    }
}

/// Filesystem change as reported by the watcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Permissions(PathBuf),
}

impl ChangeEvent {
    fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p)
            | ChangeEvent::Modified(p)
            | ChangeEvent::Removed(p)
            | ChangeEvent::Permissions(p) => p,
            ChangeEvent::Renamed { to, .. } => to,
        }
    }
}

/// Ordered event batch
///
/// Repeated modifications of one path collapse into the first, and a paired
/// rename replaces the stray remove/create halves some backends also report.
#[derive(Debug, Default)]
pub struct EventBatcher {
    max_batch_size: usize,
    pending: Vec<ChangeEvent>,
}

impl EventBatcher {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            pending: Vec::new(),
        }
    }

    /// Add an event; returns true when the batch is full.
    pub fn add_event(&mut self, event: ChangeEvent) -> bool {
        match &event {
            ChangeEvent::Modified(path) => {
                let latest = self.pending.iter().rev().find(|e| e.path() == path);
                if matches!(
                    latest,
                    Some(ChangeEvent::Modified(_)) | Some(ChangeEvent::Created(_))
                ) {
                    return false;
                }
            }
            ChangeEvent::Renamed { from, to } => {
                self.pending.retain(|pending| match pending {
                    ChangeEvent::Removed(p) => p != from,
                    ChangeEvent::Created(p) => p != to,
                    _ => true,
                });
            }
            _ => {}
        }
        self.pending.push(event);
        self.pending.len() >= self.max_batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Get and clear pending events
    pub fn take_batch(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.pending)
    }
}

/// Convert a notify event into a change event
pub fn convert_event(event: Event) -> Option<ChangeEvent> {
    let first = event.paths.first().cloned();
    match event.kind {
        EventKind::Create(_) => first.map(ChangeEvent::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            Some(ChangeEvent::Renamed {
                from: event.paths[0].clone(),
                to: event.paths[1].clone(),
            })
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => first.map(ChangeEvent::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => first.map(ChangeEvent::Created),
        EventKind::Modify(ModifyKind::Name(_)) => first.map(|p| {
            if p.exists() {
                ChangeEvent::Created(p)
            } else {
                ChangeEvent::Removed(p)
            }
        }),
        EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::Permissions)) => {
            first.map(ChangeEvent::Permissions)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => first.map(ChangeEvent::Modified),
        EventKind::Remove(_) => first.map(ChangeEvent::Removed),
        _ => None,
    }
}

/// Watch mode daemon
pub struct WatchDaemon {
    bus: Arc<EventBus>,
    snapshot: DiskSnapshot,
    config: WatchConfig,
    running: Arc<RwLock<bool>>,
}

impl WatchDaemon {
    pub fn new(bus: Arc<EventBus>, snapshot: DiskSnapshot, config: WatchConfig) -> Self {
        Self {
            bus,
            snapshot,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Shared flag; setting it to false stops the loop at the next wakeup.
    pub fn running_flag(&self) -> Arc<RwLock<bool>> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Watch the workspace and deliver events until stopped.
    pub fn start(&self) -> Result<(), SyncError> {
        *self.running.write() = true;

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Error sending watch event: {}", e);
            }
        })
        .map_err(|e| SyncError::WatchError(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.config.workspace_root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::WatchError(format!("Failed to watch directory: {}", e)))?;

        info!(workspace = ?self.config.workspace_root, "Watching workspace");

        let mut batcher = EventBatcher::new(self.config.max_batch_size);
        let batch_window = Duration::from_millis(self.config.batch_window_ms);
        let mut last_batch_time = Instant::now();

        loop {
            if !*self.running.read() {
                break;
            }

            let timeout = batch_window.saturating_sub(last_batch_time.elapsed());
            let mut flush = false;
            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    if let Some(change) = convert_event(event) {
                        flush = batcher.add_event(change);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Watch error: {}", e);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    break;
                }
            }

            if flush || (!batcher.is_empty() && last_batch_time.elapsed() >= batch_window) {
                self.process_events(batcher.take_batch())?;
                last_batch_time = Instant::now();
            } else if batcher.is_empty() && last_batch_time.elapsed() >= batch_window {
                last_batch_time = Instant::now();
            }
        }

        if !batcher.is_empty() {
            self.process_events(batcher.take_batch())?;
        }
        info!("Watch daemon stopped");
        Ok(())
    }

    /// Translate and deliver a batch in order
    ///
    /// Content that vanished before it could be read is skipped; any other
    /// failure stops processing.
    pub fn process_events(&self, events: Vec<ChangeEvent>) -> Result<(), SyncError> {
        if events.is_empty() {
            return Ok(());
        }
        debug!(event_count = events.len(), "Processing change events");

        let mut delivered = 0usize;
        for change in events {
            let translated = match self.translate(&change) {
                Ok(translated) => translated,
                Err(SyncError::ContentRead { path, source }) => {
                    warn!(path = %path, error = %source, "Content unreadable, skipping event");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for event in translated {
                match self.bus.fire(event) {
                    Ok(()) => delivered += 1,
                    Err(SyncError::ContentRead { path, source }) => {
                        warn!(path = %path, error = %source, "Content unreadable, skipping event");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(delivered, "Processed change events");
        Ok(())
    }

    /// Filesystem events for a change; empty when there is nothing to report.
    pub fn translate(&self, change: &ChangeEvent) -> Result<Vec<FsEvent>, SyncError> {
        let root = self.snapshot.workspace_root();
        let to_vpath = |path: &Path| VPath::from_fs(root, path).ok().filter(|p| !p.is_root());

        let event = match change {
            ChangeEvent::Created(path) => {
                let Some(vpath) = to_vpath(path) else { return Ok(Vec::new()) };
                if !self.snapshot.is_allowed(&vpath) {
                    return Ok(Vec::new());
                }
                self.snapshot.descriptor(&vpath)?.map(FsEvent::Created)
            }
            ChangeEvent::Modified(path) => {
                let Some(vpath) = to_vpath(path) else { return Ok(Vec::new()) };
                if !self.snapshot.is_allowed(&vpath) {
                    return Ok(Vec::new());
                }
                self.snapshot
                    .node(&vpath)?
                    .filter(|node| !node.is_directory)
                    .map(FsEvent::ContentChanged)
            }
            ChangeEvent::Removed(path) => to_vpath(path).map(removed),
            ChangeEvent::Permissions(path) => {
                let Some(vpath) = to_vpath(path) else { return Ok(Vec::new()) };
                let Ok(metadata) = std::fs::metadata(path) else { return Ok(Vec::new()) };
                let writable = (!metadata.permissions().readonly()).to_string();
                self.snapshot
                    .node(&vpath)?
                    .map(|node| FsEvent::PropertyChanged {
                        descriptor: node.shallow(),
                        property: WRITABLE_PROPERTY.to_string(),
                        old_value: None,
                        new_value: Some(writable),
                    })
            }
            ChangeEvent::Renamed { from, to } => {
                return self.translate_rename(from, to, &to_vpath);
            }
        };
        Ok(event.into_iter().collect())
    }

    fn translate_rename(
        &self,
        from: &Path,
        to: &Path,
        to_vpath: &dyn Fn(&Path) -> Option<VPath>,
    ) -> Result<Vec<FsEvent>, SyncError> {
        let (old_path, new_path) = match (to_vpath(from), to_vpath(to)) {
            (Some(old_path), Some(new_path)) => (old_path, new_path),
            (Some(old_path), None) => return Ok(vec![removed(old_path)]),
            (None, Some(new_path)) => {
                return self.translate(&ChangeEvent::Created(self.snapshot.fs_path(&new_path)))
            }
            (None, None) => return Ok(Vec::new()),
        };
        let descriptor = match self.snapshot.descriptor(&new_path)? {
            Some(descriptor) => descriptor,
            None => FileDescriptor::file(new_path.as_str(), None::<Vec<u8>>, None),
        };
        let old_parent = old_path.parent().unwrap_or_default();
        let new_parent = new_path.parent().unwrap_or_default();

        if old_parent == new_parent && self.snapshot.is_allowed(&old_path) {
            return Ok(vec![FsEvent::Renamed {
                descriptor,
                old_name: old_path.name().to_string(),
            }]);
        }
        if old_path.name() == new_path.name() {
            return Ok(vec![FsEvent::Moved {
                descriptor,
                old_parent: FileDescriptor::directory(old_parent.as_str(), None),
                new_parent: FileDescriptor::directory(new_parent.as_str(), None),
            }]);
        }
        // Renamed from an ignored name, or moved and renamed at once.
        Ok(vec![removed(old_path), FsEvent::Created(descriptor)])
    }
}

fn removed(path: VPath) -> FsEvent {
    FsEvent::Deleted {
        descriptor: FileDescriptor::file(path.as_str(), None::<Vec<u8>>, None),
        parent: None,
    }
}
