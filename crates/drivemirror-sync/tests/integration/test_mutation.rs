//! Local change propagation

use std::sync::Arc;

use drivemirror_core::domain::NamespaceTree;
use drivemirror_core::ports::RemotePatch;
use drivemirror_sync::control::SyncLock;
use drivemirror_sync::filesystem::MirrorRoot;
use drivemirror_sync::gateway::RemoteQueryGateway;
use drivemirror_sync::mutation::{CreateOutcome, MutationHandlers};
use drivemirror_sync::watcher::ChangeEvent;
use drivemirror_sync::SyncError;
use tempfile::TempDir;

use crate::common::{checksum, fast_retry, Call, FakeRemoteStore, Harness};

struct Fixture {
    store: Arc<FakeRemoteStore>,
    handlers: MutationHandlers,
    mirror: MirrorRoot,
    _dir: TempDir,
}

impl Fixture {
    fn new(store: Arc<FakeRemoteStore>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mirror = MirrorRoot::new(dir.path());
        let gateway = Arc::new(RemoteQueryGateway::new(store.clone(), fast_retry()));
        let handlers =
            MutationHandlers::new(gateway, mirror.clone(), SyncLock::new(NamespaceTree::new()));
        Self {
            store,
            handlers,
            mirror,
            _dir: dir,
        }
    }

    fn write(&self, relative: &str, content: &[u8]) -> std::path::PathBuf {
        let path = self.mirror.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn new_file_is_uploaded_into_its_folder() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let fx = Fixture::new(store);
    let path = fx.write("Docs/new.txt", b"fresh");

    let outcome = fx.handlers.on_created(&path).await.unwrap();

    assert!(matches!(outcome, CreateOutcome::Uploaded { .. }));
    assert_eq!(fx.store.child_titles(&docs), vec!["new.txt"]);
    assert_eq!(
        fx.store.mutation_calls(),
        vec![Call::Create {
            title: "new.txt".into(),
            parent: docs,
            with_content: true
        }]
    );
}

#[tokio::test]
async fn identical_remote_file_is_not_uploaded_again() {
    let store = FakeRemoteStore::new();
    store.add_file("root", "same.txt", "text/plain", b"content");
    let fx = Fixture::new(store);
    let path = fx.write("same.txt", b"content");
    assert_eq!(
        checksum(b"content"),
        drivemirror_sync::filesystem::file_md5(&path).await.unwrap()
    );

    let outcome = fx.handlers.on_created(&path).await.unwrap();

    assert_eq!(outcome, CreateOutcome::Unchanged);
    assert!(fx.store.mutation_calls().is_empty());
}

#[tokio::test]
async fn differing_remote_file_gets_a_sibling_copy() {
    let store = FakeRemoteStore::new();
    store.add_file("root", "report.txt", "text/plain", b"old");
    let fx = Fixture::new(store);
    let path = fx.write("report.txt", b"new");

    let outcome = fx.handlers.on_created(&path).await.unwrap();

    assert!(matches!(outcome, CreateOutcome::UploadedDuplicate { .. }));
    assert_eq!(
        fx.store.child_titles("root"),
        vec!["report.txt", "report.txt"]
    );
}

#[tokio::test]
async fn missing_remote_parent_fails_upload() {
    let store = FakeRemoteStore::new();
    let fx = Fixture::new(store);
    let path = fx.write("Nowhere/x.txt", b"x");

    let err = fx.handlers.on_created(&path).await.unwrap_err();

    assert!(matches!(err, SyncError::MutationFailed { operation: "upload", .. }));
    assert!(fx.store.mutation_calls().is_empty());
}

#[tokio::test]
async fn exhausted_lookup_fails_without_mutation() {
    let store = FakeRemoteStore::new();
    store.add_folder("root", "Docs");
    let fx = Fixture::new(store);
    let path = fx.write("Docs/new.txt", b"fresh");
    fx.store.fail_lists_after(0);

    let err = fx.handlers.on_created(&path).await.unwrap_err();

    assert!(err.is_query_failed());
    assert_eq!(fx.store.list_call_count(), 5);
    assert!(fx.store.mutation_calls().is_empty());
}

#[tokio::test]
async fn new_directory_creates_missing_folder_chain() {
    let store = FakeRemoteStore::new();
    let a = store.add_folder("root", "A");
    let fx = Fixture::new(store);
    let dir = fx.mirror.path().join("A/B/C");
    std::fs::create_dir_all(&dir).unwrap();

    let first = fx.handlers.on_created(&dir).await.unwrap();
    let second = fx.handlers.on_created(&dir).await.unwrap();

    assert_eq!(first, CreateOutcome::FolderCreated { created: 2 });
    assert_eq!(second, CreateOutcome::FolderExists);
    assert_eq!(fx.store.child_titles(&a), vec!["B"]);
}

#[tokio::test]
async fn vanished_path_is_skipped() {
    let fx = Fixture::new(FakeRemoteStore::new());
    let path = fx.mirror.path().join("gone.txt");

    let outcome = fx.handlers.on_created(&path).await.unwrap();

    assert_eq!(outcome, CreateOutcome::Skipped);
}

// ============================================================================
// Move / delete
// ============================================================================

#[tokio::test]
async fn rename_in_place_patches_title_only() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let notes = store.add_file(&docs, "notes.txt", "text/plain", b"n");
    let fx = Fixture::new(store);

    fx.handlers
        .on_moved(
            &fx.mirror.path().join("Docs/notes.txt"),
            &fx.mirror.path().join("Docs/notes-v2.txt"),
        )
        .await;

    assert_eq!(
        fx.store.mutation_calls(),
        vec![Call::Patch {
            id: notes,
            patch: RemotePatch::rename("notes-v2.txt"),
        }]
    );
    assert_eq!(fx.store.child_titles(&docs), vec!["notes-v2.txt"]);
}

#[tokio::test]
async fn move_across_folders_changes_parents() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let work = store.add_folder("root", "Work");
    let notes = store.add_file(&docs, "notes.txt", "text/plain", b"n");
    let fx = Fixture::new(store);

    fx.handlers
        .on_moved(
            &fx.mirror.path().join("Docs/notes.txt"),
            &fx.mirror.path().join("Work/notes.txt"),
        )
        .await;

    let calls = fx.store.mutation_calls();
    let [Call::Patch { id, patch }] = calls.as_slice() else {
        panic!("unexpected calls: {calls:?}");
    };
    assert_eq!(id, &notes);
    assert_eq!(patch.add_parent.as_ref().map(|p| p.as_str()), Some(work.as_str()));
    assert_eq!(patch.remove_parent.as_ref().map(|p| p.as_str()), Some(docs.as_str()));
    assert_eq!(patch.title, None);
}

#[tokio::test]
async fn rejected_move_is_swallowed() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    store.add_file(&docs, "notes.txt", "text/plain", b"n");
    store.fail_mutations();
    let fx = Fixture::new(store);

    fx.handlers
        .on_moved(
            &fx.mirror.path().join("Docs/notes.txt"),
            &fx.mirror.path().join("Docs/renamed.txt"),
        )
        .await;

    assert_eq!(fx.store.child_titles(&docs), vec!["notes.txt"]);
}

#[tokio::test]
async fn deletion_trashes_remote_entry() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let fx = Fixture::new(store);

    fx.handlers.on_deleted(&fx.mirror.path().join("Docs")).await;

    assert!(fx.store.is_trashed(&docs));
}

#[tokio::test]
async fn deletion_of_unknown_path_does_nothing() {
    let fx = Fixture::new(FakeRemoteStore::new());

    fx.handlers
        .on_deleted(&fx.mirror.path().join("never-synced.txt"))
        .await;

    assert!(fx.store.mutation_calls().is_empty());
}

#[tokio::test]
async fn coordinator_routes_change_events() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let h = Harness::new(store.clone()).await;

    h.coordinator
        .handle_change(ChangeEvent::Deleted(h.local("Docs")))
        .await;

    assert!(store.is_trashed(&docs));
}
