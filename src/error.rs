//! Error types for the strata synchronization engine.

use crate::tree::path::VPath;
use thiserror::Error;

/// Versioned tree errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Entry not found: {0}")]
    EntryNotFound(VPath),

    #[error("Entry already exists: {0}")]
    EntryExists(VPath),

    #[error("Parent entry not found for: {0}")]
    ParentNotFound(VPath),

    #[error("Not a directory: {0}")]
    NotADirectory(VPath),

    #[error("Not a file: {0}")]
    NotAFile(VPath),

    #[error("Invalid move from {from} to {to}")]
    InvalidMove { from: VPath, to: VPath },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// True when the error describes a tree shape the operation cannot apply to,
    /// as opposed to a failure of the storage itself.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            StorageError::EntryNotFound(_)
                | StorageError::EntryExists(_)
                | StorageError::ParentNotFound(_)
                | StorageError::NotADirectory(_)
                | StorageError::NotAFile(_)
                | StorageError::InvalidMove { .. }
        )
    }
}

/// Errors surfaced by the reconciler, the service and the CLI
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Failed to read physical content of {path}: {source}")]
    ContentRead {
        path: VPath,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan {0}")]
    ScanError(String),

    #[error("Path not tracked: {0}. Run `strata sync` to update the tree or start `strata watch`.")]
    PathNotTracked(VPath),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Watch error: {0}")]
    WatchError(String),
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::ConfigError(err.to_string())
    }
}
