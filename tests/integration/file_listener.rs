//! Reconciler behaviour for each kind of change notification

use crate::integration::test_utils::{content_of, has, reconciler, FixedContent, RecordingTree, ScopeFilter};
use std::sync::Arc;
use strata::event::{FileDescriptor, FileEventListener, FsEvent};
use strata::reconcile::Reconciler;
use strata::store::{InMemoryTree, VersionedTree};
use strata::tree::path::VPath;

fn setup() -> (Arc<InMemoryTree>, Arc<ScopeFilter>, Reconciler) {
    let tree = Arc::new(InMemoryTree::new());
    let scope = ScopeFilter::new();
    let reconciler = reconciler(tree.clone(), &scope);
    (tree, scope, reconciler)
}

fn file(path: &str, content: Option<&str>, timestamp: Option<i64>) -> FileDescriptor {
    FileDescriptor::file(path, content, timestamp)
}

fn dir(path: &str) -> FileDescriptor {
    FileDescriptor::directory(path, None)
}

#[test]
fn test_creating_files() {
    let (tree, _scope, reconciler) = setup();
    reconciler
        .on_created(&file("file", Some("content"), Some(123)))
        .unwrap();

    let entry = tree.find_entry(&VPath::new("file")).unwrap().unwrap();
    assert!(!entry.is_directory());
    assert_eq!(entry.content(), Some(&b"content"[..]));
    assert_eq!(entry.timestamp, Some(123));
}

#[test]
fn test_physical_content_wins_on_creation() {
    let (tree, _scope, reconciler) = setup();
    reconciler
        .content()
        .register_provider(Arc::new(FixedContent("physical")));

    reconciler.on_created(&file("f", Some("memory"), None)).unwrap();
    assert_eq!(content_of(&*tree, "f"), "physical");
}

#[test]
fn test_creating_directories() {
    let (tree, _scope, reconciler) = setup();
    reconciler
        .on_created(&FileDescriptor::directory("dir", Some(345)))
        .unwrap();

    let entry = tree.find_entry(&VPath::new("dir")).unwrap().unwrap();
    assert!(entry.is_directory());
    assert_eq!(entry.timestamp, Some(345));
}

#[test]
fn test_creating_directories_with_children() {
    let (tree, _scope, reconciler) = setup();
    let dir1 = dir("dir1").with_child(dir("dir2").with_child(file("file", Some(""), None)));
    reconciler.on_created(&dir1).unwrap();

    assert!(has(&*tree, "dir1"));
    assert!(has(&*tree, "dir1/dir2"));
    assert!(has(&*tree, "dir1/dir2/file"));
}

#[test]
fn test_directory_with_children_is_one_change() {
    let (tree, _scope, reconciler) = setup();
    let created = dir("dir")
        .with_child(file("one", None, None))
        .with_child(file("two", None, None));
    reconciler.on_created(&created).unwrap();

    assert!(has(&*tree, "dir"));
    assert!(has(&*tree, "dir/one"));
    assert!(has(&*tree, "dir/two"));
    assert_eq!(tree.changesets_for(&VPath::new("dir")).unwrap().len(), 1);
}

#[test]
fn test_filtered_children_are_not_created() {
    let (tree, scope, reconciler) = setup();
    scope.set_not_allowed(&["target"]);
    let created = dir("crate")
        .with_child(file("lib.rs", Some("pub"), None))
        .with_child(dir("target").with_child(file("out", Some("bin"), None)));
    reconciler.on_created(&created).unwrap();

    assert!(has(&*tree, "crate/lib.rs"));
    assert!(!has(&*tree, "crate/target"));
    assert!(!has(&*tree, "crate/target/out"));
}

#[test]
fn test_changing_file_content() {
    let (tree, _scope, reconciler) = setup();
    tree.create_file(&VPath::new("file"), b"old content", None)
        .unwrap();

    reconciler
        .on_content_changed(&file("file", Some("new content"), Some(505)))
        .unwrap();

    let entry = tree.find_entry(&VPath::new("file")).unwrap().unwrap();
    assert_eq!(entry.content(), Some(&b"new content"[..]));
    assert_eq!(entry.timestamp, Some(505));
}

#[test]
fn test_physical_content_wins_on_content_change() {
    let (tree, _scope, reconciler) = setup();
    reconciler
        .content()
        .register_provider(Arc::new(FixedContent("physical")));
    tree.create_file(&VPath::new("f"), b"content", None).unwrap();

    reconciler
        .on_content_changed(&file("f", Some("memory"), None))
        .unwrap();
    assert_eq!(content_of(&*tree, "f"), "physical");
}

#[test]
fn test_content_change_of_untracked_file_is_ignored() {
    let (tree, _scope, reconciler) = setup();
    reconciler
        .on_content_changed(&file("ghost", Some("boo"), None))
        .unwrap();
    assert!(!has(&*tree, "ghost"));
    assert_eq!(tree.changeset_count(), 0);
}

#[test]
fn test_renaming() {
    let (tree, _scope, reconciler) = setup();
    tree.create_file(&VPath::new("old name"), b"old content", None)
        .unwrap();

    reconciler
        .on_renamed(&file("new name", None, None), "old name")
        .unwrap();

    assert!(!has(&*tree, "old name"));
    assert_eq!(content_of(&*tree, "new name"), "old content");
}

#[test]
fn test_renaming_to_filtered_name_drops_entry() {
    let (tree, scope, reconciler) = setup();
    tree.create_file(&VPath::new("notes.txt"), b"n", None).unwrap();
    scope.set_not_allowed(&["notes.txt~"]);

    reconciler
        .on_renamed(&file("notes.txt~", None, None), "notes.txt")
        .unwrap();

    assert!(!has(&*tree, "notes.txt"));
    assert!(!has(&*tree, "notes.txt~"));

    reconciler
        .on_created(&file("notes.txt~", Some("n"), None))
        .unwrap();
    assert!(!has(&*tree, "notes.txt"));
    assert!(!has(&*tree, "notes.txt~"));
}

fn tracked_root(tree: &InMemoryTree) {
    tree.create_directory(&VPath::new("myRoot"), None).unwrap();
    tree.create_file(&VPath::new("myRoot/keep"), b"k", None).unwrap();
}

#[test]
fn test_nameless_move_out_of_root_keeps_root() {
    let (tree, scope, reconciler) = setup();
    tracked_root(&tree);
    scope.set_outside_roots(&["outside"]);
    let before = tree.changeset_count();

    reconciler
        .on_moved(&file("", None, None), &dir("myRoot"), &dir("outside"))
        .unwrap();

    assert!(has(&*tree, "myRoot/keep"));
    assert_eq!(tree.changeset_count(), before);
}

#[test]
fn test_nameless_deletion_keeps_parent() {
    let (tree, _scope, reconciler) = setup();
    tracked_root(&tree);

    reconciler
        .on_deleted(&file("", None, None), Some(&dir("myRoot")))
        .unwrap();

    assert!(has(&*tree, "myRoot"));
    assert!(has(&*tree, "myRoot/keep"));
}

#[test]
fn test_rename_from_empty_name_is_ignored() {
    let (tree, scope, reconciler) = setup();
    tracked_root(&tree);
    scope.set_not_allowed(&["x.tmp"]);

    reconciler
        .on_renamed(&file("myRoot/x.tmp", None, None), "")
        .unwrap();
    reconciler
        .on_renamed(&file("myRoot/y", None, None), "..")
        .unwrap();

    assert!(has(&*tree, "myRoot"));
    assert!(has(&*tree, "myRoot/keep"));
    assert!(!has(&*tree, "myRoot/y"));
}

#[test]
fn test_do_nothing_on_another_property_change() {
    let (tree, _scope, reconciler) = setup();
    tree.create_file(&VPath::new("file"), b"x", None).unwrap();
    let before = tree.changeset_count();

    reconciler
        .on_property_changed(&file("file", None, None), "another property", None, None)
        .unwrap();
    assert_eq!(tree.changeset_count(), before);
}

#[test]
fn test_tracked_property_change_is_recorded() {
    let (tree, _scope, reconciler) = setup();
    tree.create_file(&VPath::new("file"), b"x", None).unwrap();

    reconciler
        .on_property_changed(&file("file", None, None), "writable", Some("true"), Some("false"))
        .unwrap();

    let entry = tree.find_entry(&VPath::new("file")).unwrap().unwrap();
    assert_eq!(entry.property("writable"), Some("false"));
}

#[test]
fn test_moving() {
    let (tree, _scope, reconciler) = setup();
    tree.create_directory(&VPath::new("dir1"), None).unwrap();
    tree.create_directory(&VPath::new("dir2"), None).unwrap();
    tree.create_file(&VPath::new("dir1/file"), b"content", None)
        .unwrap();

    let new_parent = dir("dir2").with_child(file("file", None, None));
    let moved = new_parent.children[0].clone();
    reconciler.on_moved(&moved, &dir("dir1"), &new_parent).unwrap();

    assert!(!has(&*tree, "dir1/file"));
    assert_eq!(content_of(&*tree, "dir2/file"), "content");
}

#[test]
fn test_moving_filtered_file() {
    let (tree, scope, reconciler) = setup();
    tree.create_directory(&VPath::new("dir1"), None).unwrap();
    tree.create_directory(&VPath::new("dir2"), None).unwrap();
    scope.set_not_allowed(&["file"]);

    reconciler
        .on_moved(&file("dir2/file", None, None), &dir("dir1"), &dir("dir2"))
        .unwrap();

    assert!(!has(&*tree, "dir1/file"));
    assert!(!has(&*tree, "dir2/file"));
}

#[test]
fn test_moving_from_outside_of_the_content_roots() {
    let (tree, scope, reconciler) = setup();
    tree.create_directory(&VPath::new("myRoot"), None).unwrap();
    scope.set_outside_roots(&["anotherRoot"]);

    reconciler
        .on_moved(
            &file("myRoot/file", Some("content"), None),
            &dir("anotherRoot"),
            &dir("myRoot"),
        )
        .unwrap();

    assert_eq!(content_of(&*tree, "myRoot/file"), "content");
}

#[test]
fn test_moving_directory_from_outside_brings_its_children() {
    let (tree, scope, reconciler) = setup();
    tree.create_directory(&VPath::new("myRoot"), None).unwrap();
    scope.set_outside_roots(&["anotherRoot"]);

    let moved = dir("myRoot/pkg").with_child(file("a", Some("a"), None));
    reconciler
        .on_moved(&moved, &dir("anotherRoot"), &dir("myRoot"))
        .unwrap();

    assert!(has(&*tree, "myRoot/pkg"));
    assert_eq!(content_of(&*tree, "myRoot/pkg/a"), "a");
}

#[test]
fn test_moving_filtered_file_from_outside_of_the_content_roots() {
    let (tree, scope, reconciler) = setup();
    tree.create_directory(&VPath::new("myRoot"), None).unwrap();
    scope.set_outside_roots(&["anotherRoot"]);
    scope.set_not_allowed(&["file"]);

    reconciler
        .on_moved(
            &file("myRoot/file", Some("content"), None),
            &dir("anotherRoot"),
            &dir("myRoot"),
        )
        .unwrap();

    assert!(!has(&*tree, "myRoot/file"));
}

#[test]
fn test_moving_to_outside_of_the_content_roots() {
    let (tree, scope, reconciler) = setup();
    tree.create_directory(&VPath::new("myRoot"), None).unwrap();
    tree.create_file(&VPath::new("myRoot/file"), b"", None).unwrap();
    scope.set_outside_roots(&["anotherRoot"]);

    reconciler
        .on_moved(
            &file("anotherRoot/file", Some("content"), None),
            &dir("myRoot"),
            &dir("anotherRoot"),
        )
        .unwrap();

    assert!(!has(&*tree, "myRoot/file"));
    assert!(!has(&*tree, "anotherRoot/file"));
}

#[test]
fn test_moving_filtered_file_to_outside_of_the_content_roots() {
    let (tree, scope, reconciler) = setup();
    tree.create_directory(&VPath::new("myRoot"), None).unwrap();
    scope.set_outside_roots(&["anotherRoot"]);
    scope.set_not_allowed(&["file"]);

    reconciler
        .on_moved(
            &file("anotherRoot/file", Some("content"), None),
            &dir("myRoot"),
            &dir("anotherRoot"),
        )
        .unwrap();

    assert!(!has(&*tree, "myRoot/file"));
}

#[test]
fn test_moving_around_outside_content_roots() {
    let (tree, scope, reconciler) = setup();
    scope.set_outside_roots(&["root1", "root2"]);

    reconciler
        .on_moved(
            &file("root2/file", Some("content"), None),
            &dir("root1"),
            &dir("root2"),
        )
        .unwrap();

    assert!(!has(&*tree, "root1/file"));
    assert!(!has(&*tree, "root2/file"));
    assert_eq!(tree.changeset_count(), 0);
}

#[test]
fn test_deletion_from_directory() {
    let (tree, _scope, reconciler) = setup();
    tree.create_directory(&VPath::new("dir"), None).unwrap();
    tree.create_file(&VPath::new("file"), b"", None).unwrap();

    reconciler
        .on_deleted(&file("file", None, None), Some(&dir("dir")))
        .unwrap();

    assert!(has(&*tree, "dir"));
    assert!(!has(&*tree, "dir/file"));
}

#[test]
fn test_deletion_without_parent() {
    let (tree, _scope, reconciler) = setup();
    tree.create_file(&VPath::new("file"), b"", None).unwrap();

    reconciler.on_deleted(&file("file", None, None), None).unwrap();
    assert!(!has(&*tree, "file"));
}

#[test]
fn test_deletion_of_untracked_file_does_not_fail() {
    let (tree, _scope, reconciler) = setup();
    reconciler
        .on_deleted(&file("non-existent", None, None), None)
        .unwrap();
    assert_eq!(tree.changeset_count(), 0);
}

#[test]
fn test_deleting_directory_removes_subtree() {
    let (tree, _scope, reconciler) = setup();
    reconciler
        .on_created(&dir("dir").with_child(dir("sub").with_child(file("f", Some("f"), None))))
        .unwrap();

    reconciler.on_deleted(&dir("dir"), None).unwrap();
    assert!(tree.is_empty());
}

#[test]
fn test_filtering_files() {
    let tree = Arc::new(RecordingTree::default());
    let scope = ScopeFilter::new();
    let reconciler = reconciler(tree.clone(), &scope);
    scope.set_outside_roots(&["file"]);

    let f = file("file", None, None);
    reconciler.on_created(&f).unwrap();
    reconciler.on_content_changed(&f).unwrap();
    reconciler.on_moved(&f, &f, &f).unwrap();

    assert_eq!(tree.calls(), 0);
}

#[test]
fn test_events_dispatch_through_listener() {
    let (tree, _scope, reconciler) = setup();
    let events = vec![
        FsEvent::Created(dir("src").with_child(file("main.rs", Some("fn main() {}"), Some(1)))),
        FsEvent::ContentChanged(file("src/main.rs", Some("fn main() { run() }"), Some(2))),
        FsEvent::Renamed {
            descriptor: file("src/app.rs", None, None),
            old_name: "main.rs".to_string(),
        },
        FsEvent::PropertyChanged {
            descriptor: file("src/app.rs", None, None),
            property: "encoding".to_string(),
            old_value: None,
            new_value: Some("UTF-8".to_string()),
        },
    ];
    for event in &events {
        reconciler.handle(event).unwrap();
    }

    let entry = tree.find_entry(&VPath::new("src/app.rs")).unwrap().unwrap();
    assert_eq!(entry.content(), Some(&b"fn main() { run() }"[..]));
    assert_eq!(entry.timestamp, Some(2));
    assert_eq!(entry.property("encoding"), Some("UTF-8"));
    assert!(!has(&*tree, "src/main.rs"));

    reconciler
        .handle(&FsEvent::Deleted {
            descriptor: file("app.rs", None, None),
            parent: Some(dir("src")),
        })
        .unwrap();
    assert!(!has(&*tree, "src/app.rs"));
    assert!(has(&*tree, "src"));
}
