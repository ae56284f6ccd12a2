//! Strata: Filesystem Change Reconciliation
//!
//! Keeps a versioned tree of file contents in step with the live filesystem.
//! Change notifications (create, content change, rename, move, delete, property
//! change) are translated into atomic changesets, and whole content roots can be
//! synchronised against their on-disk state.

pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod filter;
pub mod logging;
pub mod reconcile;
pub mod roots;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod tree;
pub mod types;
pub mod watch;
