//! Shared test utilities for integration tests
//!
//! Scope doubles, a call-counting tree and environment isolation for config tests.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata::content::{ContentSource, PhysicalContentProvider};
use strata::error::{StorageError, SyncError};
use strata::event::FileDescriptor;
use strata::filter::PathFilter;
use strata::reconcile::Reconciler;
use strata::roots::{ContentRoot, ContentRoots};
use strata::service::RootScanner;
use strata::store::{Changeset, ChangesetRecord, InMemoryTree, VersionedTree};
use strata::tree::entry::Entry;
use strata::tree::path::VPath;
use strata::types::ChangesetId;
use tempfile::TempDir;

/// Filter and content-root double driven by path lists
///
/// Everything is allowed and under a content root until told otherwise.
#[derive(Default)]
pub struct ScopeFilter {
    not_allowed: Mutex<HashSet<String>>,
    outside_roots: Mutex<Vec<VPath>>,
}

impl ScopeFilter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every path whose last segment is one of `names`.
    pub fn set_not_allowed(&self, names: &[&str]) {
        *self.not_allowed.lock() = names.iter().map(|n| n.to_string()).collect();
    }

    /// Treat the given paths, and everything below them, as outside all content roots.
    pub fn set_outside_roots(&self, paths: &[&str]) {
        *self.outside_roots.lock() = paths.iter().map(VPath::new).collect();
    }
}

impl PathFilter for ScopeFilter {
    fn is_allowed(&self, path: &VPath) -> bool {
        !self.not_allowed.lock().contains(path.name())
    }
}

impl ContentRoots for ScopeFilter {
    fn root_for(&self, path: &VPath) -> Option<ContentRoot> {
        let outside = self
            .outside_roots
            .lock()
            .iter()
            .any(|excluded| path.starts_with(excluded));
        if outside {
            None
        } else {
            Some(ContentRoot::at(""))
        }
    }
}

/// Provider returning the same bytes for every path
pub struct FixedContent(pub &'static str);

impl PhysicalContentProvider for FixedContent {
    fn read(&self, _path: &VPath) -> Result<Vec<u8>, SyncError> {
        Ok(self.0.as_bytes().to_vec())
    }
}

/// Scanner for services whose roots are never scanned from disk
pub struct NoDisk;

impl RootScanner for NoDisk {
    fn scan(&self, _root: &ContentRoot) -> Result<Option<FileDescriptor>, SyncError> {
        Ok(None)
    }
}

/// Versioned tree wrapper counting every call made on it
#[derive(Default)]
pub struct RecordingTree {
    inner: InMemoryTree,
    calls: AtomicUsize,
}

impl RecordingTree {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl VersionedTree for RecordingTree {
    fn find_entry(&self, path: &VPath) -> Result<Option<Entry>, StorageError> {
        self.record();
        self.inner.find_entry(path)
    }

    fn apply(&self, changeset: Changeset) -> Result<ChangesetId, StorageError> {
        self.record();
        self.inner.apply(changeset)
    }

    fn changesets_for(&self, path: &VPath) -> Result<Vec<ChangesetRecord>, StorageError> {
        self.record();
        self.inner.changesets_for(path)
    }

    fn children(&self, path: &VPath) -> Result<Vec<VPath>, StorageError> {
        self.record();
        self.inner.children(path)
    }
}

/// Reconciler over `tree` scoped by `scope`, without a physical provider.
pub fn reconciler(tree: Arc<dyn VersionedTree>, scope: &Arc<ScopeFilter>) -> Reconciler {
    Reconciler::new(
        tree,
        scope.clone(),
        scope.clone(),
        Arc::new(ContentSource::new()),
    )
}

/// Content of the entry at `path`, as a string.
pub fn content_of(tree: &dyn VersionedTree, path: &str) -> String {
    let entry = tree
        .find_entry(&VPath::new(path))
        .unwrap()
        .unwrap_or_else(|| panic!("no entry at {}", path));
    String::from_utf8(entry.content().unwrap().to_vec()).unwrap()
}

pub fn has(tree: &dyn VersionedTree, path: &str) -> bool {
    tree.has_entry(&VPath::new(path)).unwrap()
}

/// Global mutex serializing tests that touch HOME, XDG_CONFIG_HOME or STRATA_* variables
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Environment variable state to restore after test
struct EnvState {
    home: Option<String>,
    xdg_config_home: Option<String>,
    strata_env: Option<String>,
}

impl EnvState {
    fn capture() -> Self {
        Self {
            home: std::env::var("HOME").ok(),
            xdg_config_home: std::env::var("XDG_CONFIG_HOME").ok(),
            strata_env: std::env::var("STRATA_ENV").ok(),
        }
    }

    fn restore(self) {
        restore_var("HOME", self.home);
        restore_var("XDG_CONFIG_HOME", self.xdg_config_home);
        restore_var("STRATA_ENV", self.strata_env);
    }
}

fn restore_var(name: &str, value: Option<String>) {
    match value {
        Some(orig) => std::env::set_var(name, orig),
        None => std::env::remove_var(name),
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir`
///
/// XDG_CONFIG_HOME is `test_dir` itself, so the global config file lives at
/// `test_dir/strata/config.toml`. The original environment is restored afterwards.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();

    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().to_str().unwrap());
    std::env::remove_var("STRATA_ENV");

    let result = f();

    env_state.restore();

    result
}
