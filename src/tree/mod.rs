//! Versioned tree model
//!
//! Logical paths, content hashing and the entries persisted by a versioned tree.

pub mod entry;
pub mod hasher;
pub mod path;
