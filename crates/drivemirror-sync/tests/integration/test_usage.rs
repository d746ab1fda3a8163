//! Usage scans and namespace tree population

use drivemirror_core::accounts::AccountStore;
use drivemirror_core::domain::{RemoteId, UsageCounters};
use drivemirror_core::ports::{Outcome, StatusEvent};

use crate::common::{drain, FakeRemoteStore, Harness, IDENTITY};

#[tokio::test]
async fn scan_classifies_files_and_records_folders() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    store.add_file(&docs, "a.pdf", "application/pdf", &[0u8; 100]);
    store.add_file("root", "b.mp3", "audio/mpeg", &[0u8; 50]);
    let h = Harness::new(store).await;

    let counters = h.coordinator.scan_usage_once(true).await.unwrap().unwrap();

    assert_eq!(
        counters,
        UsageCounters {
            audio: 50,
            documents: 100,
            file_count: 2,
            ..UsageCounters::default()
        }
    );
    let tree = h.coordinator.directory_tree().await;
    let docs_id = RemoteId::new(docs).unwrap();
    assert_eq!(tree.resolve_path(&docs_id).as_deref(), Some("Docs"));
    assert_eq!(h.coordinator.usage().await, Some(counters));
}

#[tokio::test]
async fn scan_reports_progress_against_counted_total() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    store.add_file(&docs, "a.pdf", "application/pdf", b"pdf");
    store.add_native_doc("root", "Plan");
    let h = Harness::new(store).await;
    let mut events = h.coordinator.subscribe();

    h.coordinator.scan_usage_once(true).await.unwrap();

    assert_eq!(
        drain(&mut events),
        vec![
            StatusEvent::UsageStarted { total: 3 },
            StatusEvent::UsageUpdate { processed: 1 },
            StatusEvent::UsageUpdate { processed: 2 },
            StatusEvent::UsageUpdate { processed: 3 },
            StatusEvent::UsageDone {
                outcome: Outcome::Success
            },
        ]
    );
}

#[tokio::test]
async fn failed_scan_zeroes_counters_and_keeps_stored_usage() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    store.add_file(&docs, "a.pdf", "application/pdf", b"pdf");
    store.add_file("root", "b.mp3", "audio/mpeg", b"mp3");
    let h = Harness::new(store.clone()).await;
    let mut events = h.coordinator.subscribe();

    // Count pass lists root and Docs, the scan pass fails on Docs
    store.fail_lists_after(3);
    let err = h.coordinator.scan_usage_once(true).await.unwrap_err();

    assert!(err.is_query_failed());
    let usage = h.coordinator.usage().await.unwrap();
    assert_eq!(usage.total_bytes(), 0);
    assert_eq!(
        drain(&mut events).last(),
        Some(&StatusEvent::UsageDone {
            outcome: Outcome::Failure
        })
    );

    let accounts = AccountStore::open(&h.accounts_path(), h.dir.path()).unwrap();
    assert!(accounts.account(IDENTITY).unwrap().drive_usage.is_none());
}

#[tokio::test]
async fn stored_usage_skips_unforced_scan() {
    let store = FakeRemoteStore::new();
    store.add_file("root", "b.mp3", "audio/mpeg", b"mp3");
    let h = Harness::new(store.clone()).await;
    h.coordinator.scan_usage_once(true).await.unwrap();
    store.clear_calls();
    let mut events = h.coordinator.subscribe();

    let skipped = h.coordinator.scan_usage_once(false).await.unwrap();

    assert!(skipped.is_none());
    assert_eq!(store.list_call_count(), 0);
    assert_eq!(
        drain(&mut events),
        vec![StatusEvent::UsageDone {
            outcome: Outcome::Success
        }]
    );
}

#[tokio::test]
async fn successful_scan_persists_usage_and_snapshot() {
    let store = FakeRemoteStore::new();
    let music = store.add_folder("root", "Music");
    store.add_file(&music, "song.mp3", "audio/mpeg", b"la la la");
    let h = Harness::new(store).await;

    h.coordinator.scan_usage_once(true).await.unwrap();

    let accounts = AccountStore::open(&h.accounts_path(), h.dir.path()).unwrap();
    let stored = accounts.account(IDENTITY).unwrap().drive_usage.unwrap();
    assert_eq!(stored.audio, 8);
    assert_eq!(stored.file_count, 1);

    let snapshot = h.snapshots.get(IDENTITY).expect("snapshot saved");
    assert!(snapshot.contains(&RemoteId::new(music).unwrap()));
}

#[tokio::test]
async fn folders_gone_from_drive_leave_the_tree() {
    let store = FakeRemoteStore::new();
    let docs = store.add_folder("root", "Docs");
    let work = store.add_folder(&docs, "Work");
    let h = Harness::new(store.clone()).await;
    h.coordinator.scan_usage_once(true).await.unwrap();
    assert_eq!(h.coordinator.directory_tree().await.len(), 2);

    store.remove(&work);
    h.coordinator.scan_usage_once(true).await.unwrap();

    let tree = h.coordinator.directory_tree().await;
    assert!(tree.contains(&RemoteId::new(docs).unwrap()));
    assert!(!tree.contains(&RemoteId::new(work).unwrap()));
}
