//! Root synchronisation from real directories

use crate::integration::test_utils::{content_of, has};
use std::fs;
use std::sync::Arc;
use strata::content::{ContentSource, DiskContentProvider};
use strata::event::EventBus;
use strata::filter::GlobPathFilter;
use strata::reconcile::Reconciler;
use strata::roots::{ContentRoot, ContentRootRegistry};
use strata::service::SyncService;
use strata::snapshot::DiskSnapshot;
use strata::store::{InMemoryTree, VersionedTree};
use strata::tree::path::VPath;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    tree: Arc<InMemoryTree>,
    service: SyncService,
}

fn workspace(roots: Vec<ContentRoot>) -> Workspace {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("app/src")).unwrap();
    fs::create_dir_all(root.join("app/target")).unwrap();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("app/Cargo.toml"), "[package]").unwrap();
    fs::write(root.join("app/src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("app/target/app"), "elf").unwrap();
    fs::write(root.join("docs/readme.md"), "# docs").unwrap();

    let filter = Arc::new(GlobPathFilter::new(["target"], ["log"]).unwrap());
    let tree = Arc::new(InMemoryTree::new());
    let registry = Arc::new(ContentRootRegistry::new(roots));
    let reconciler = Arc::new(Reconciler::new(
        tree.clone(),
        filter.clone(),
        registry.clone(),
        Arc::new(ContentSource::with_provider(Arc::new(DiskContentProvider::new(
            root.to_path_buf(),
        )))),
    ));
    let snapshot = DiskSnapshot::new(root.to_path_buf(), filter).without_content();
    let service = SyncService::new(
        reconciler,
        registry,
        Arc::new(EventBus::new()),
        Arc::new(snapshot),
    );
    Workspace { dir, tree, service }
}

#[test]
fn test_initial_sync_mirrors_disk() {
    let ws = workspace(vec![ContentRoot::at("app")]);
    let report = ws.service.start().unwrap();

    // app, app/Cargo.toml, app/src, app/src/main.rs
    assert_eq!(report.created, 4);
    assert_eq!(content_of(&*ws.tree, "app/src/main.rs"), "fn main() {}");
    assert!(!has(&*ws.tree, "app/target"));
    assert!(!has(&*ws.tree, "docs"));

    let entry = ws
        .tree
        .find_entry(&VPath::new("app/Cargo.toml"))
        .unwrap()
        .unwrap();
    assert!(entry.timestamp.is_some());
}

#[test]
fn test_resync_picks_up_offline_changes() {
    let ws = workspace(vec![ContentRoot::at("app")]);
    ws.service.start().unwrap();

    let root = ws.dir.path();
    fs::write(root.join("app/src/main.rs"), "fn main() { changed() }").unwrap();
    fs::remove_file(root.join("app/Cargo.toml")).unwrap();
    fs::write(root.join("app/src/lib.rs"), "pub fn changed() {}").unwrap();
    fs::write(root.join("app/src/debug.log"), "noise").unwrap();

    let report = ws.service.synchronize().unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);

    assert_eq!(
        content_of(&*ws.tree, "app/src/main.rs"),
        "fn main() { changed() }"
    );
    assert!(!has(&*ws.tree, "app/Cargo.toml"));
    assert!(has(&*ws.tree, "app/src/lib.rs"));
    assert!(!has(&*ws.tree, "app/src/debug.log"));

    let quiet = ws.service.synchronize().unwrap();
    assert!(quiet.is_empty());
}

#[test]
fn test_nested_roots_sync_once() {
    let ws = workspace(vec![ContentRoot::at("app"), ContentRoot::at("app/src")]);
    let report = ws.service.start().unwrap();
    assert_eq!(report.created, 4);
    assert_eq!(ws.tree.changesets_for(&VPath::new("app")).unwrap().len(), 1);
}

#[test]
fn test_adding_a_root_tracks_it() {
    let ws = workspace(vec![ContentRoot::at("app")]);
    ws.service.start().unwrap();

    let report = ws
        .service
        .roots_changed(vec![ContentRoot::at("app"), ContentRoot::at("docs")])
        .unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(content_of(&*ws.tree, "docs/readme.md"), "# docs");
}
