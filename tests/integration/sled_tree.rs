//! Reconciliation against the sled-backed tree

use crate::integration::test_utils::{content_of, has, reconciler, ScopeFilter};
use std::sync::Arc;
use strata::event::FileDescriptor;
use strata::store::{SledVersionedTree, VersionedTree};
use strata::tree::path::VPath;
use tempfile::TempDir;

#[test]
fn test_created_subtree_is_one_persisted_changeset() {
    let temp_dir = TempDir::new().unwrap();
    let tree = Arc::new(SledVersionedTree::new(temp_dir.path()).unwrap());
    let scope = ScopeFilter::new();
    let reconciler = reconciler(tree.clone(), &scope);

    let created = FileDescriptor::directory("dir1", None).with_child(
        FileDescriptor::directory("dir2", None)
            .with_child(FileDescriptor::file("file", Some("payload"), Some(9))),
    );
    reconciler.on_created(&created).unwrap();

    assert!(has(&*tree, "dir1"));
    assert!(has(&*tree, "dir1/dir2"));
    assert_eq!(content_of(&*tree, "dir1/dir2/file"), "payload");
    assert_eq!(tree.changesets_for(&VPath::new("dir1")).unwrap().len(), 1);
}

#[test]
fn test_move_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let tree = Arc::new(SledVersionedTree::new(temp_dir.path()).unwrap());
        tree.create_directory(&VPath::new("dir1"), None).unwrap();
        tree.create_directory(&VPath::new("dir2"), None).unwrap();
        tree.create_file(&VPath::new("dir1/file"), b"content", None)
            .unwrap();

        let scope = ScopeFilter::new();
        let reconciler = reconciler(tree.clone(), &scope);
        reconciler
            .on_moved(
                &FileDescriptor::file("dir2/file", None::<&str>, None),
                &FileDescriptor::directory("dir1", None),
                &FileDescriptor::directory("dir2", None),
            )
            .unwrap();
        tree.flush().unwrap();
    }

    let tree = SledVersionedTree::new(temp_dir.path()).unwrap();
    assert!(!has(&tree, "dir1/file"));
    assert_eq!(content_of(&tree, "dir2/file"), "content");

    let dir1 = tree.find_entry(&VPath::new("dir1")).unwrap().unwrap();
    assert_eq!(dir1.children().count(), 0);

    let history = tree.changesets_for(&VPath::new("dir1/file")).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].label, "move dir1/file to dir2/file");

    // ids keep counting after reopen
    let id = tree.create_file(&VPath::new("late"), b"", None).unwrap();
    assert_eq!(id, 5);
}

#[test]
fn test_children_of_root() {
    let temp_dir = TempDir::new().unwrap();
    let tree = SledVersionedTree::new(temp_dir.path()).unwrap();
    tree.create_directory(&VPath::new("a"), None).unwrap();
    tree.create_file(&VPath::new("a/x"), b"", None).unwrap();
    tree.create_file(&VPath::new("b"), b"", None).unwrap();

    assert_eq!(
        tree.children(&VPath::root()).unwrap(),
        vec![VPath::new("a"), VPath::new("b")]
    );
    assert_eq!(tree.children(&VPath::new("a")).unwrap(), vec![VPath::new("a/x")]);
    assert!(tree.children(&VPath::new("b")).unwrap().is_empty());
}
