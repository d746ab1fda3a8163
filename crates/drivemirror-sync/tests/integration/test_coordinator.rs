//! Control surface and background loops

use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::accounts::AccountStore;
use drivemirror_core::domain::{RemoteId, SelectionEntry};
use drivemirror_core::ports::{Outcome, StatusEvent};
use drivemirror_sync::coordinator::{CoordinatorOptions, SyncCoordinator};
use drivemirror_sync::watcher::ChangeEvent;
use drivemirror_sync::SyncError;
use tokio_util::sync::CancellationToken;

use crate::common::{drain, fast_retry, FakeRemoteStore, Harness, IDENTITY};

async fn next_matching(
    rx: &mut tokio::sync::broadcast::Receiver<StatusEvent>,
    wanted: impl Fn(&StatusEvent) -> bool,
) -> StatusEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("status channel closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for status event")
}

#[tokio::test]
async fn new_account_defaults_to_whole_drive() {
    let h = Harness::new(FakeRemoteStore::new()).await;

    assert!(h.coordinator.sync_selection().await.is_root());
    assert!(h.coordinator.is_sync_enabled());
    assert!(!h.coordinator.is_calculating_usage());
    assert_eq!(h.coordinator.usage().await, None);
    assert!(h.coordinator.mirror_directory().ends_with(IDENTITY));
}

#[tokio::test]
async fn pause_and_resume_toggle_the_gate() {
    let h = Harness::new(FakeRemoteStore::new()).await;

    h.coordinator.stop_sync();
    assert!(!h.coordinator.is_sync_enabled());
    h.coordinator.start_sync();
    assert!(h.coordinator.is_sync_enabled());
}

#[tokio::test]
async fn selecting_unknown_folder_fails() {
    let h = Harness::new(FakeRemoteStore::new()).await;

    let err = h
        .coordinator
        .select_folder(&RemoteId::new("F404".into()).unwrap())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(h.coordinator.sync_selection().await.is_root());
}

#[tokio::test]
async fn selection_is_persisted_by_tree_path() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let work = store.add_folder(&docs, "Work");
    let h = Harness::new(store).await;
    h.coordinator.scan_usage_once(true).await.unwrap();

    h.coordinator
        .select_folder(&RemoteId::new(work.clone()).unwrap())
        .await
        .unwrap();

    let accounts = AccountStore::open(&h.accounts_path(), h.dir.path()).unwrap();
    let selection = &accounts.account(IDENTITY).unwrap().sync_selection;
    match selection.entries() {
        [SelectionEntry::Folder { path, id }] => {
            assert_eq!(path.as_str(), "Docs/Work");
            assert_eq!(id.as_str(), work);
        }
        other => panic!("unexpected selection: {other:?}"),
    }

    let back = h.coordinator.select_root().await.unwrap();
    assert!(back.is_root());
}

#[tokio::test]
async fn restored_snapshot_allows_selection_before_any_scan() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let first = Harness::new(store.clone()).await;
    first.coordinator.scan_usage_once(true).await.unwrap();

    // A fresh coordinator sharing the saved snapshot, no scan run yet
    let dir = tempfile::tempdir().unwrap();
    let accounts =
        AccountStore::open(&dir.path().join("accounts.json"), &dir.path().join("mirror")).unwrap();
    let restored = SyncCoordinator::new(
        IDENTITY,
        store,
        first.snapshots.clone(),
        accounts,
        CoordinatorOptions {
            retry: fast_retry(),
            ..CoordinatorOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(restored.directory_tree().await.len(), 1);
    let selection = restored
        .select_folder(&RemoteId::new(docs).unwrap())
        .await
        .unwrap();
    assert!(!selection.is_root());
}

#[tokio::test]
async fn usage_loop_runs_startup_scan() {
    let store = FakeRemoteStore::new();
    store.add_file("root", "clip.mp4", "video/mp4", &[0u8; 40]);
    let h = Arc::new(Harness::new(store).await);
    let mut events = h.coordinator.subscribe();
    let shutdown = CancellationToken::new();

    let task = {
        let h = h.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { h.coordinator.run_usage_loop(shutdown).await })
    };

    let done = next_matching(&mut events, |e| matches!(e, StatusEvent::UsageDone { .. })).await;
    assert_eq!(
        done,
        StatusEvent::UsageDone {
            outcome: Outcome::Success
        }
    );
    assert_eq!(h.coordinator.usage().await.unwrap().movies, 40);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn sync_loop_counts_down_between_cycles() {
    let store = FakeRemoteStore::new();
    store.add_file("root", "a.txt", "text/plain", b"a");
    let h = Arc::new(
        Harness::with_options(
            store,
            CoordinatorOptions {
                interval: Duration::from_secs(1),
                retry: fast_retry(),
                start_enabled: true,
            },
        )
        .await,
    );
    let mut events = h.coordinator.subscribe();
    let shutdown = CancellationToken::new();

    let task = {
        let h = h.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { h.coordinator.run_sync_loop(shutdown).await })
    };

    next_matching(&mut events, |e| matches!(e, StatusEvent::SyncDone { .. })).await;
    let tick = next_matching(&mut events, |e| matches!(e, StatusEvent::SyncCountdown { .. })).await;
    assert_eq!(tick.to_string(), "Sync starts in 00m:01s");
    next_matching(&mut events, |e| *e == StatusEvent::SyncStarted).await;
    assert!(h.local("a.txt").is_file());

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn paused_sync_loop_waits_for_resume() {
    let store = FakeRemoteStore::new();
    store.add_file("root", "a.txt", "text/plain", b"a");
    let h = Arc::new(
        Harness::with_options(
            store,
            CoordinatorOptions {
                interval: Duration::from_secs(1),
                retry: fast_retry(),
                start_enabled: false,
            },
        )
        .await,
    );
    let mut events = h.coordinator.subscribe();
    let shutdown = CancellationToken::new();

    let task = {
        let h = h.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { h.coordinator.run_sync_loop(shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());
    assert!(!h.local("a.txt").exists());

    h.coordinator.start_sync();
    next_matching(&mut events, |e| {
        *e == StatusEvent::SyncDone {
            outcome: Outcome::Success,
        }
    })
    .await;
    assert!(h.local("a.txt").is_file());

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn invalid_selection_does_not_pause_sync() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let h = Harness::new(store.clone()).await;
    h.coordinator.scan_usage_once(true).await.unwrap();
    h.coordinator
        .select_folder(&RemoteId::new(docs.clone()).unwrap())
        .await
        .unwrap();
    store.remove(&docs);

    let err = h.coordinator.sync_once().await.unwrap_err();

    assert!(matches!(err, SyncError::SelectionInvalid { .. }));
    assert!(h.coordinator.is_sync_enabled());
}

#[tokio::test]
async fn local_changes_propagate_while_paused() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let h = Harness::new(store.clone()).await;
    std::fs::create_dir_all(h.local("Docs")).unwrap();
    std::fs::write(h.local("Docs/new.txt"), b"written while paused").unwrap();

    h.coordinator.stop_sync();
    h.coordinator
        .handle_change(ChangeEvent::Created(h.local("Docs/new.txt")))
        .await;

    assert!(!h.coordinator.is_sync_enabled());
    assert_eq!(store.child_titles(&docs), vec!["new.txt"]);
}

#[tokio::test]
async fn pause_during_countdown_holds_the_ticks() {
    let store = FakeRemoteStore::new();
    let h = Arc::new(
        Harness::with_options(
            store,
            CoordinatorOptions {
                interval: Duration::from_secs(3),
                retry: fast_retry(),
                start_enabled: true,
            },
        )
        .await,
    );
    let mut events = h.coordinator.subscribe();
    let shutdown = CancellationToken::new();

    let task = {
        let h = h.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { h.coordinator.run_sync_loop(shutdown).await })
    };

    next_matching(&mut events, |e| {
        *e == StatusEvent::SyncCountdown { remaining_secs: 3 }
    })
    .await;
    h.coordinator.stop_sync();

    // At most the tick already under way gets out before the gate holds
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let held = drain(&mut events);
    assert!(!held.contains(&StatusEvent::SyncCountdown { remaining_secs: 1 }));
    assert!(!held.contains(&StatusEvent::SyncStarted));

    h.coordinator.start_sync();
    next_matching(&mut events, |e| {
        *e == StatusEvent::SyncCountdown { remaining_secs: 1 }
    })
    .await;
    next_matching(&mut events, |e| *e == StatusEvent::SyncStarted).await;

    shutdown.cancel();
    task.await.unwrap();
}
