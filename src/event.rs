//! Filesystem events and their delivery
//!
//! A [`FileDescriptor`] is the transient snapshot of a node when an event fires.
//! Event sources deliver [`FsEvent`]s, one at a time, to a single subscribed
//! [`FileEventListener`].

use crate::error::SyncError;
use crate::tree::path::VPath;
use crate::types::Timestamp;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::trace;

/// Snapshot of a filesystem node at event time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: VPath,
    pub is_directory: bool,
    /// In-memory content; may be absent or stale
    pub content: Option<Vec<u8>>,
    pub timestamp: Option<Timestamp>,
    /// Current children, for directories
    pub children: Vec<FileDescriptor>,
}

impl FileDescriptor {
    pub fn file(
        path: impl AsRef<str>,
        content: Option<impl Into<Vec<u8>>>,
        timestamp: Option<Timestamp>,
    ) -> Self {
        Self {
            path: VPath::new(path),
            is_directory: false,
            content: content.map(Into::into),
            timestamp,
            children: Vec::new(),
        }
    }

    pub fn directory(path: impl AsRef<str>, timestamp: Option<Timestamp>) -> Self {
        Self {
            path: VPath::new(path),
            is_directory: true,
            content: None,
            timestamp,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// Attach a child, placing it (and its descendants) under this descriptor's path.
    pub fn with_child(mut self, child: FileDescriptor) -> Self {
        self.add_child(child);
        self
    }

    pub fn add_child(&mut self, mut child: FileDescriptor) {
        let path = self.path.child(child.name());
        child.set_path(path);
        self.children.push(child);
    }

    /// Copy of this descriptor moved to `path`, descendants included.
    pub fn relocated(&self, path: VPath) -> FileDescriptor {
        let mut copy = self.clone();
        copy.set_path(path);
        copy
    }

    /// This descriptor without its children.
    pub fn shallow(&self) -> FileDescriptor {
        FileDescriptor {
            children: Vec::new(),
            ..self.clone()
        }
    }

    fn set_path(&mut self, path: VPath) {
        self.path = path;
        let mut pending: Vec<&mut FileDescriptor> = vec![self];
        while let Some(node) = pending.pop() {
            let base = node.path.clone();
            for child in node.children.iter_mut() {
                let name = child.name().to_string();
                child.path = base.child(&name);
                pending.push(child);
            }
        }
    }
}

/// Raw filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(FileDescriptor),
    ContentChanged(FileDescriptor),
    /// `descriptor` carries the new path
    Renamed {
        descriptor: FileDescriptor,
        old_name: String,
    },
    Moved {
        descriptor: FileDescriptor,
        old_parent: FileDescriptor,
        new_parent: FileDescriptor,
    },
    Deleted {
        descriptor: FileDescriptor,
        parent: Option<FileDescriptor>,
    },
    PropertyChanged {
        descriptor: FileDescriptor,
        property: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
}

impl FsEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FsEvent::Created(_) => "created",
            FsEvent::ContentChanged(_) => "content_changed",
            FsEvent::Renamed { .. } => "renamed",
            FsEvent::Moved { .. } => "moved",
            FsEvent::Deleted { .. } => "deleted",
            FsEvent::PropertyChanged { .. } => "property_changed",
        }
    }

    /// Descriptor the event is about.
    pub fn subject(&self) -> &FileDescriptor {
        match self {
            FsEvent::Created(descriptor) | FsEvent::ContentChanged(descriptor) => descriptor,
            FsEvent::Renamed { descriptor, .. }
            | FsEvent::Moved { descriptor, .. }
            | FsEvent::Deleted { descriptor, .. }
            | FsEvent::PropertyChanged { descriptor, .. } => descriptor,
        }
    }
}

/// Consumer of filesystem events
pub trait FileEventListener: Send + Sync {
    fn handle(&self, event: &FsEvent) -> Result<(), SyncError>;
}

/// Capability to deliver events to one subscribed listener
pub trait EventSource: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn FileEventListener>);
    fn unsubscribe(&self);
    fn is_subscribed(&self) -> bool;
}

/// In-process event source with serial delivery
///
/// `fire` holds a delivery lock for the whole call, so a listener never sees
/// two events at once even when several threads fire.
#[derive(Default)]
pub struct EventBus {
    listener: RwLock<Option<Arc<dyn FileEventListener>>>,
    delivery: Mutex<()>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event`; dropped silently when nobody is subscribed.
    pub fn fire(&self, event: FsEvent) -> Result<(), SyncError> {
        let _delivery = self.delivery.lock();
        let listener = self.listener.read().clone();
        match listener {
            Some(listener) => listener.handle(&event),
            None => {
                trace!(kind = event.kind(), path = %event.subject().path, "No listener, event dropped");
                Ok(())
            }
        }
    }
}

impl EventSource for EventBus {
    fn subscribe(&self, listener: Arc<dyn FileEventListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Waits for an in-flight delivery; must not be called from a listener.
    fn unsubscribe(&self) {
        let _delivery = self.delivery.lock();
        *self.listener.write() = None;
    }

    fn is_subscribed(&self) -> bool {
        self.listener.read().is_some()
    }
}
