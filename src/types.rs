//! Shared scalar types.

/// BLAKE3 digest (32 bytes).
pub type Hash = [u8; 32];

/// Milliseconds since the Unix epoch, as reported by the filesystem.
pub type Timestamp = i64;

/// Sequence number assigned to a committed changeset.
pub type ChangesetId = u64;
