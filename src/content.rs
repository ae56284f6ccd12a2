//! Content Source
//!
//! Resolves the bytes to store for a descriptor. A registered physical provider
//! is authoritative; without one the descriptor's in-memory content is used.

use crate::error::SyncError;
use crate::event::FileDescriptor;
use crate::tree::path::VPath;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Reads content from durable storage
pub trait PhysicalContentProvider: Send + Sync {
    fn read(&self, path: &VPath) -> Result<Vec<u8>, SyncError>;
}

/// Reads files relative to a workspace root on the local disk
#[derive(Debug, Clone)]
pub struct DiskContentProvider {
    root: PathBuf,
}

impl DiskContentProvider {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn fs_path(&self, path: &VPath) -> PathBuf {
        if path.is_root() {
            self.root.clone()
        } else {
            self.root.join(path.as_str())
        }
    }
}

impl PhysicalContentProvider for DiskContentProvider {
    fn read(&self, path: &VPath) -> Result<Vec<u8>, SyncError> {
        std::fs::read(self.fs_path(path)).map_err(|source| SyncError::ContentRead {
            path: path.clone(),
            source,
        })
    }
}

/// Content resolution with an optional physical provider (zero or one at a time)
#[derive(Default)]
pub struct ContentSource {
    provider: RwLock<Option<Arc<dyn PhysicalContentProvider>>>,
}

impl ContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: Arc<dyn PhysicalContentProvider>) -> Self {
        Self {
            provider: RwLock::new(Some(provider)),
        }
    }

    /// Register the physical provider, replacing any previous one.
    pub fn register_provider(&self, provider: Arc<dyn PhysicalContentProvider>) {
        *self.provider.write() = Some(provider);
    }

    pub fn unregister_provider(&self) {
        *self.provider.write() = None;
    }

    pub fn has_provider(&self) -> bool {
        self.provider.read().is_some()
    }

    /// Bytes to store for `descriptor`.
    ///
    /// The physical provider wins over in-memory content even when both are present.
    pub fn resolve(&self, descriptor: &FileDescriptor) -> Result<Vec<u8>, SyncError> {
        let provider = self.provider.read().clone();
        match provider {
            Some(provider) => {
                debug!(path = %descriptor.path, "Reading physical content");
                provider.read(&descriptor.path)
            }
            None => Ok(descriptor.content.clone().unwrap_or_default()),
        }
    }
}
