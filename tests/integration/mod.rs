//! Integration tests for the Strata filesystem reconciler

mod file_listener;
mod sled_tree;
mod snapshot_sync;
mod test_utils;
