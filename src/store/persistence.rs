//! Persistence layer for the Versioned Tree

use crate::error::StorageError;
use crate::store::staging::{EntryTable, Staging};
use crate::store::{Changeset, ChangesetRecord, VersionedTree};
use crate::tree::entry::Entry;
use crate::tree::path::VPath;
use crate::types::ChangesetId;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::Path;
use tracing::trace;

const ENTRY_PREFIX: &str = "entry:";
const CHANGESET_PREFIX: &str = "changeset:";

/// Sled-based implementation of VersionedTree
///
/// Entries live under `entry:<path>`, history under `changeset:<id>` with the id
/// zero-padded so key order matches commit order. Each changeset is written as
/// one `sled::Batch`.
pub struct SledVersionedTree {
    db: sled::Db,
    /// Serializes writers; also guards the id counter
    writer: Mutex<ChangesetId>,
}

impl SledVersionedTree {
    /// Open (or create) a tree at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::from_db(db)
    }

    /// Wrap an already opened database
    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let last_id = match db.scan_prefix(CHANGESET_PREFIX).next_back() {
            Some(item) => {
                let (_, value) = item.map_err(sled_error("Failed to read changeset history"))?;
                decode::<ChangesetRecord>(&value)?.id
            }
            None => 0,
        };
        Ok(Self {
            db,
            writer: Mutex::new(last_id),
        })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(sled_error("Failed to flush database"))?;
        Ok(())
    }

    /// All entries in key order.
    pub fn list_entries(&self) -> Result<Vec<Entry>, StorageError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(ENTRY_PREFIX) {
            let (_, value) = item.map_err(sled_error("Failed to iterate entries"))?;
            entries.push(decode::<Entry>(&value)?);
        }
        Ok(entries)
    }

    fn entry_key(path: &VPath) -> Vec<u8> {
        format!("{}{}", ENTRY_PREFIX, path.as_str()).into_bytes()
    }

    fn changeset_key(id: ChangesetId) -> Vec<u8> {
        format!("{}{:020}", CHANGESET_PREFIX, id).into_bytes()
    }
}

impl EntryTable for SledVersionedTree {
    fn load(&self, path: &VPath) -> Result<Option<Entry>, StorageError> {
        match self
            .db
            .get(Self::entry_key(path))
            .map_err(sled_error("Failed to get entry"))?
        {
            Some(value) => Ok(Some(decode::<Entry>(&value)?)),
            None => Ok(None),
        }
    }
}

impl VersionedTree for SledVersionedTree {
    fn find_entry(&self, path: &VPath) -> Result<Option<Entry>, StorageError> {
        self.load(path)
    }

    fn apply(&self, changeset: Changeset) -> Result<ChangesetId, StorageError> {
        let mut last_id = self.writer.lock();

        let mut staging = Staging::new(self);
        let mut changes = Vec::with_capacity(changeset.operations.len());
        for operation in &changeset.operations {
            changes.push(staging.apply(operation)?);
        }

        let mut batch = sled::Batch::default();
        for (path, entry) in staging.into_writes() {
            match entry {
                Some(entry) => batch.insert(Self::entry_key(&path), encode(&entry)?),
                None => batch.remove(Self::entry_key(&path)),
            }
        }

        let id = *last_id + 1;
        let record = ChangesetRecord {
            id,
            label: changeset.label,
            committed_at: Utc::now(),
            changes,
        };
        batch.insert(Self::changeset_key(id), encode(&record)?);

        self.db
            .apply_batch(batch)
            .map_err(sled_error("Failed to apply changeset"))?;
        *last_id = id;

        trace!(changeset = id, label = %record.label, "Committed changeset");
        Ok(id)
    }

    fn changesets_for(&self, path: &VPath) -> Result<Vec<ChangesetRecord>, StorageError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix(CHANGESET_PREFIX) {
            let (_, value) = item.map_err(sled_error("Failed to iterate changesets"))?;
            let record: ChangesetRecord = decode(&value)?;
            if record.touches(path) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn children(&self, path: &VPath) -> Result<Vec<VPath>, StorageError> {
        if !path.is_root() {
            return Ok(self
                .load(path)?
                .map(|entry| entry.child_paths())
                .unwrap_or_default());
        }
        let mut children = Vec::new();
        for item in self.db.scan_prefix(ENTRY_PREFIX) {
            let (key, _) = item.map_err(sled_error("Failed to iterate entries"))?;
            let key = String::from_utf8_lossy(&key[ENTRY_PREFIX.len()..]).into_owned();
            if !key.contains('/') {
                children.push(VPath::new(key));
            }
        }
        Ok(children)
    }
}

fn sled_error(context: &'static str) -> impl Fn(sled::Error) -> StorageError {
    move |e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{}: {}", context, e),
        ))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize record: {}", e),
        ))
    })
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to deserialize record: {}", e),
        ))
    })
}
