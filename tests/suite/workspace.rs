//! Saving through the engine into a versioned workspace.

use onpoint_engine::{EditorSurface, NodeKind, VERSIONS_DIR, WorkspaceError};
use onpoint_types::DocumentPath;

use crate::common::{engine_for, manual_options, start_assistant_mock, temp_workspace};

#[tokio::test]
async fn save_snapshots_previous_content() {
    let server = start_assistant_mock().await;
    let (_dir, workspace) = temp_workspace();
    let mut engine = engine_for(&server, manual_options());
    let doc = DocumentPath::new("src/app.py");

    engine.open_document(&doc, "print('v1')\n");
    assert!(engine.save_document(&doc, &workspace).expect("first save"));
    assert!(workspace.versions(doc.as_str()).expect("list").is_empty());

    engine.on_content_change(&doc, "print('v2')\n");
    assert!(engine.session(&doc).is_some_and(|s| s.is_dirty()));
    assert!(engine.save_document(&doc, &workspace).expect("second save"));
    assert!(engine.session(&doc).is_some_and(|s| !s.is_dirty()));

    assert_eq!(workspace.read(doc.as_str()).expect("read"), "print('v2')\n");
    let versions = workspace.versions(doc.as_str()).expect("list");
    assert_eq!(versions.len(), 1);

    let restored = workspace.restore(doc.as_str(), &versions[0]).expect("restore");
    assert_eq!(restored, "print('v1')\n");
    assert_eq!(workspace.read(doc.as_str()).expect("read"), "print('v1')\n");
    assert_eq!(workspace.versions(doc.as_str()).expect("list").len(), 2);
}

#[tokio::test]
async fn saving_outside_the_root_is_refused() {
    let server = start_assistant_mock().await;
    let (_dir, workspace) = temp_workspace();
    let mut engine = engine_for(&server, manual_options());
    let doc = DocumentPath::new("../escape.py");

    engine.open_document(&doc, "x = 1\n");
    let err = engine
        .save_document(&doc, &workspace)
        .expect_err("parent traversal rejected");
    assert!(matches!(err, WorkspaceError::OutsideRoot(_)));
    assert!(engine.session(&doc).is_some_and(|s| s.content() == "x = 1\n"));
    assert_eq!(engine.surface().value(), "x = 1\n");
}

#[tokio::test]
async fn unopened_document_is_not_saved() {
    let server = start_assistant_mock().await;
    let (_dir, workspace) = temp_workspace();
    let mut engine = engine_for(&server, manual_options());

    let saved = engine
        .save_document(&DocumentPath::new("ghost.py"), &workspace)
        .expect("no io");
    assert!(!saved);
    assert!(workspace.tree().expect("tree").is_empty());
}

#[test]
fn tree_hides_version_store() {
    let (_dir, workspace) = temp_workspace();
    workspace.write("pkg/mod.py", "a").expect("write");
    workspace.write("pkg/mod.py", "b").expect("write");
    workspace.write("README.md", "r").expect("write");

    let tree = workspace.tree().expect("tree");
    let names: Vec<&str> = tree.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, ["pkg", "README.md"]);
    assert!(names.iter().all(|name| *name != VERSIONS_DIR));
    assert_eq!(tree[0].kind, NodeKind::Directory);
    assert_eq!(tree[0].children.len(), 1);
}
