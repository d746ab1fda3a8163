//! Storage usage aggregation
//!
//! A scan walks the whole drive twice. The first pass only counts entries so
//! progress can be reported against a total. The second pass classifies
//! every binary file by MIME type into one of five buckets and inserts every
//! folder into the namespace tree. Folders that the scan did not see are
//! dropped from the tree afterwards.
//!
//! The scan runs under the [`SyncLock`]; the tree it fills is the one the
//! lock owns.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use drivemirror_core::domain::{
    ContentCategory, NamespaceTree, RemoteId, RemoteNode, UsageCounters,
};
use drivemirror_core::ports::StatusEvent;

use crate::control::{StatusNotifier, SyncLock};
use crate::gateway::RemoteQueryGateway;
use crate::SyncError;

type CountFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, SyncError>> + Send + 'a>>;
type ScanFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>>;

/// A scan that stopped part way
///
/// `counters` has all five buckets zeroed.
#[derive(Debug)]
pub struct ScanFailure {
    pub counters: UsageCounters,
    pub error: SyncError,
}

/// Completed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub counters: UsageCounters,
    /// Entries seen by the counting pass, folders included
    pub total_entries: u64,
    /// Folders removed from the tree because they no longer exist
    pub stale_removed: usize,
}

struct ScanState {
    counters: UsageCounters,
    processed: u64,
    seen_folders: HashSet<RemoteId>,
}

// ============================================================================
// UsageAggregator
// ============================================================================

pub struct UsageAggregator {
    gateway: Arc<RemoteQueryGateway>,
    lock: SyncLock,
    notifier: StatusNotifier,
    calculating: AtomicBool,
}

impl UsageAggregator {
    pub fn new(gateway: Arc<RemoteQueryGateway>, lock: SyncLock, notifier: StatusNotifier) -> Self {
        Self {
            gateway,
            lock,
            notifier,
            calculating: AtomicBool::new(false),
        }
    }

    /// Whether a scan is in progress
    pub fn is_calculating(&self) -> bool {
        self.calculating.load(Ordering::SeqCst)
    }

    /// Count, then classify every entry of the drive
    ///
    /// Emits `UsageStarted` with the counted total and a `UsageUpdate` per
    /// entry. The caller emits `UsageDone` once results are persisted.
    /// Returns the tree as it stands after the scan.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self) -> Result<(ScanReport, NamespaceTree), ScanFailure> {
        let mut tree = self.lock.lock().await;
        self.calculating.store(true, Ordering::SeqCst);
        let result = self.scan_tree(&mut tree).await;
        self.calculating.store(false, Ordering::SeqCst);
        result.map(|report| (report, tree.clone()))
    }

    async fn scan_tree(&self, tree: &mut NamespaceTree) -> Result<ScanReport, ScanFailure> {
        let fail = |error: SyncError, mut counters: UsageCounters| {
            counters.reset_buckets();
            warn!(error = %error, "Usage scan failed");
            ScanFailure { counters, error }
        };

        let total_entries = self
            .count_entries(RemoteId::root())
            .await
            .map_err(|e| fail(e, UsageCounters::default()))?;
        self.notifier.emit(StatusEvent::UsageStarted {
            total: total_entries,
        });
        info!(total_entries, "Usage scan started");

        let mut state = ScanState {
            counters: UsageCounters::default(),
            processed: 0,
            seen_folders: HashSet::new(),
        };
        if let Err(e) = self.scan_folder(RemoteId::root(), tree, &mut state).await {
            return Err(fail(e, state.counters));
        }

        let stale: Vec<RemoteId> = tree
            .iter()
            .filter(|n| !state.seen_folders.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();
        let stale_removed = stale
            .iter()
            .filter_map(|id| tree.remove(id))
            .count();
        if stale_removed > 0 {
            debug!(stale_removed, "Dropped folders no longer on the drive");
        }

        info!(
            files = state.counters.file_count,
            bytes = state.counters.total_bytes(),
            folders = tree.len(),
            "Usage scan complete"
        );
        Ok(ScanReport {
            counters: state.counters,
            total_entries,
            stale_removed,
        })
    }

    fn count_entries(&self, folder_id: RemoteId) -> CountFuture<'_> {
        Box::pin(async move {
            let children = self.gateway.list_children(&folder_id).await?;
            let mut count = 0u64;
            for child in children {
                count += 1;
                if child.is_folder() {
                    count += self.count_entries(child.id).await?;
                }
            }
            Ok(count)
        })
    }

    fn scan_folder<'a>(
        &'a self,
        folder_id: RemoteId,
        tree: &'a mut NamespaceTree,
        state: &'a mut ScanState,
    ) -> ScanFuture<'a> {
        Box::pin(async move {
            let children = self.gateway.list_children(&folder_id).await?;
            for child in children {
                state.processed += 1;
                self.notifier.emit(StatusEvent::UsageUpdate {
                    processed: state.processed,
                });

                if child.is_folder() {
                    let id = child.id.clone();
                    place_folder(tree, &folder_id, child)?;
                    state.seen_folders.insert(id.clone());
                    self.scan_folder(id, tree, state).await?;
                } else if !child.is_native_document() {
                    let category = ContentCategory::classify(&child.mime_type);
                    state.counters.record(category, child.size);
                }
            }
            Ok(())
        })
    }
}

/// Insert `folder` under `parent_id`, re-placing it if it was renamed or
/// moved since the tree last saw it
fn place_folder(
    tree: &mut NamespaceTree,
    parent_id: &RemoteId,
    folder: RemoteNode,
) -> Result<(), SyncError> {
    let moved = tree
        .get(&folder.id)
        .is_some_and(|known| known.parent_id.as_ref() != Some(parent_id) || known.name != folder.name);
    if moved {
        tree.remove(&folder.id);
    }
    tree.insert(parent_id, folder)?;
    Ok(())
}
