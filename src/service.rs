//! Sync Service
//!
//! Owns the reconciler's lifecycle: synchronises every content root at startup,
//! then subscribes the reconciler to an event source until shutdown.

use crate::error::SyncError;
use crate::event::{EventSource, FileDescriptor};
use crate::reconcile::{Reconciler, SyncReport};
use crate::roots::{ContentRoot, ContentRootRegistry};
use crate::snapshot::DiskSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Produces a full snapshot of a content root
pub trait RootScanner: Send + Sync {
    /// `None` when the root does not exist.
    fn scan(&self, root: &ContentRoot) -> Result<Option<FileDescriptor>, SyncError>;
}

impl RootScanner for DiskSnapshot {
    fn scan(&self, root: &ContentRoot) -> Result<Option<FileDescriptor>, SyncError> {
        self.descriptor(&root.path)
    }
}

pub struct SyncService {
    reconciler: Arc<Reconciler>,
    roots: Arc<ContentRootRegistry>,
    source: Arc<dyn EventSource>,
    scanner: Arc<dyn RootScanner>,
    started: RwLock<bool>,
}

impl SyncService {
    pub fn new(
        reconciler: Arc<Reconciler>,
        roots: Arc<ContentRootRegistry>,
        source: Arc<dyn EventSource>,
        scanner: Arc<dyn RootScanner>,
    ) -> Self {
        Self {
            reconciler,
            roots,
            source,
            scanner,
            started: RwLock::new(false),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn roots(&self) -> &Arc<ContentRootRegistry> {
        &self.roots
    }

    pub fn is_started(&self) -> bool {
        *self.started.read()
    }

    /// Synchronise all roots, then start listening.
    ///
    /// Events fired before this call are not applied.
    pub fn start(&self) -> Result<SyncReport, SyncError> {
        let mut started = self.started.write();
        if *started {
            debug!("Sync service already started");
            return Ok(SyncReport::default());
        }
        let report = self.synchronize()?;
        self.source.subscribe(self.reconciler.clone());
        *started = true;
        info!(
            roots = self.roots.roots().len(),
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            "Sync service started"
        );
        Ok(report)
    }

    /// Stop listening; later events are not applied.
    pub fn shutdown(&self) {
        let mut started = self.started.write();
        self.source.unsubscribe();
        if *started {
            info!("Sync service stopped");
        }
        *started = false;
    }

    /// Replace the content roots and bring the tree in line with them.
    pub fn roots_changed(&self, roots: Vec<ContentRoot>) -> Result<SyncReport, SyncError> {
        self.roots.set_roots(roots);
        self.synchronize()
    }

    /// Synchronise every outermost content root with its on-disk state.
    pub fn synchronize(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        for root in self.roots.outermost_roots() {
            match self.scanner.scan(&root)? {
                Some(descriptor) => report.merge(self.reconciler.synchronize_root(&descriptor)?),
                None => {
                    debug!(root = %root.path, name = %root.name, "Content root missing on disk");
                    let before = self.reconciler.tree().has_entry(&root.path)?;
                    self.reconciler
                        .on_deleted(&FileDescriptor::directory(root.path.as_str(), None), None)?;
                    if before && !self.reconciler.tree().has_entry(&root.path)? {
                        report.deleted += 1;
                    }
                }
            }
        }
        Ok(report)
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if *self.started.read() {
            self.source.unsubscribe();
        }
    }
}
