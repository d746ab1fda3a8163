//! Sync coordinator
//!
//! Owns one account's engine, aggregator and mutation handlers together
//! with the shared control primitives, and exposes:
//!
//! - the control surface (pause/resume, selection, usage requests, tree and
//!   usage queries, status subscription)
//! - three background loops: periodic reconciliation with a per-second
//!   countdown, usage scans on request, and local change propagation
//!
//! All three loops stop when the shutdown token is cancelled.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use drivemirror_core::accounts::AccountStore;
use drivemirror_core::config::Config;
use drivemirror_core::domain::{DrivePath, NamespaceTree, RemoteId, SyncSelection, UsageCounters};
use drivemirror_core::ports::{IRemoteStore, ISnapshotStore, Outcome, StatusEvent};

use crate::control::{StatusNotifier, SyncGate, SyncLock, UsageTrigger};
use crate::filesystem::MirrorRoot;
use crate::gateway::{RemoteQueryGateway, RetryPolicy};
use crate::mutation::{CreateOutcome, MutationHandlers};
use crate::reconcile::{CycleReport, ReconciliationEngine};
use crate::usage::UsageAggregator;
use crate::watcher::ChangeEvent;
use crate::SyncError;

/// Tunables taken from [`Config`]
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Idle time between reconciliation cycles
    pub interval: Duration,
    pub retry: RetryPolicy,
    /// Whether the pause gate starts open
    pub start_enabled: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            retry: RetryPolicy::default(),
            start_enabled: true,
        }
    }
}

impl From<&Config> for CoordinatorOptions {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.sync.interval(),
            retry: RetryPolicy::from(&config.retry),
            start_enabled: true,
        }
    }
}

// ============================================================================
// SyncCoordinator
// ============================================================================

pub struct SyncCoordinator {
    identity: String,
    interval: Duration,
    mirror: MirrorRoot,
    lock: SyncLock,
    gate: SyncGate,
    notifier: StatusNotifier,
    usage_trigger: UsageTrigger,
    engine: ReconciliationEngine,
    aggregator: UsageAggregator,
    mutations: MutationHandlers,
    snapshots: Arc<dyn ISnapshotStore>,
    accounts: Mutex<AccountStore>,
    usage: Mutex<Option<UsageCounters>>,
}

impl SyncCoordinator {
    /// Build the coordinator for `identity`
    ///
    /// Registers the account if it is new, restores the namespace tree
    /// snapshot when one exists, and queues the startup usage check.
    ///
    /// # Errors
    /// Fails if the accounts document cannot be written.
    pub async fn new(
        identity: impl Into<String>,
        store: Arc<dyn IRemoteStore>,
        snapshots: Arc<dyn ISnapshotStore>,
        mut accounts: AccountStore,
        options: CoordinatorOptions,
    ) -> Result<Self, SyncError> {
        let identity = identity.into();
        let account = accounts.ensure_account(&identity)?;

        let tree = match snapshots.load(&identity).await {
            Ok(Some(tree)) => {
                info!(folders = tree.len(), "Restored namespace snapshot");
                tree
            }
            Ok(None) => NamespaceTree::new(),
            Err(e) => {
                warn!(error = %e, "Namespace snapshot unreadable, starting empty");
                NamespaceTree::new()
            }
        };

        let mirror = MirrorRoot::new(account.mirror_directory.clone());
        let gateway = Arc::new(RemoteQueryGateway::new(store, options.retry));
        let lock = SyncLock::new(tree);
        let gate = SyncGate::new(options.start_enabled);
        let notifier = StatusNotifier::new();

        let coordinator = Self {
            engine: ReconciliationEngine::new(
                gateway.clone(),
                mirror.clone(),
                lock.clone(),
                gate.clone(),
                notifier.clone(),
            ),
            aggregator: UsageAggregator::new(gateway.clone(), lock.clone(), notifier.clone()),
            mutations: MutationHandlers::new(gateway, mirror.clone(), lock.clone()),
            identity,
            interval: options.interval,
            mirror,
            lock,
            gate,
            notifier,
            usage_trigger: UsageTrigger::new(),
            snapshots,
            usage: Mutex::new(account.drive_usage),
            accounts: Mutex::new(accounts),
        };
        coordinator.usage_trigger.request(false);
        Ok(coordinator)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn mirror_directory(&self) -> &Path {
        self.mirror.path()
    }

    // ------------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------------

    pub fn start_sync(&self) {
        info!(identity = %self.identity, "Sync resumed");
        self.gate.enable();
    }

    pub fn stop_sync(&self) {
        info!(identity = %self.identity, "Sync paused");
        self.gate.disable();
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    pub fn is_calculating_usage(&self) -> bool {
        self.aggregator.is_calculating()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.notifier.subscribe()
    }

    pub async fn sync_selection(&self) -> SyncSelection {
        self.accounts
            .lock()
            .await
            .account(&self.identity)
            .map(|a| a.sync_selection.clone())
            .unwrap_or_default()
    }

    /// Mirror the whole drive
    pub async fn select_root(&self) -> Result<SyncSelection, SyncError> {
        let mut selection = self.sync_selection().await;
        selection.select_root();
        self.persist_selection(selection).await
    }

    /// Add the folder `id`, as known to the namespace tree, to the selection
    ///
    /// # Errors
    /// [`SyncError::NotFound`] if the tree does not hold `id`.
    pub async fn select_folder(&self, id: &RemoteId) -> Result<SyncSelection, SyncError> {
        if id.is_root() {
            return self.select_root().await;
        }
        let path = self
            .lock
            .lock()
            .await
            .resolve_path(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let path = DrivePath::new(path)?;

        let mut selection = self.sync_selection().await;
        if !selection.select_folder(path.clone(), id.clone()) {
            debug!(path = %path, "Folder already selected");
        }
        self.persist_selection(selection).await
    }

    async fn persist_selection(&self, selection: SyncSelection) -> Result<SyncSelection, SyncError> {
        self.accounts
            .lock()
            .await
            .set_selection(&self.identity, selection.clone())?;
        info!(entries = selection.entries().len(), "Sync selection saved");
        Ok(selection)
    }

    /// Ask for a usage scan even if stored counters exist
    pub fn request_usage_recalculation(&self) {
        self.usage_trigger.request(true);
    }

    /// Copy of the namespace tree
    pub async fn directory_tree(&self) -> NamespaceTree {
        self.lock.tree_snapshot().await
    }

    /// Latest usage counters, stored or freshly scanned
    pub async fn usage(&self) -> Option<UsageCounters> {
        *self.usage.lock().await
    }

    // ------------------------------------------------------------------------
    // Single runs
    // ------------------------------------------------------------------------

    /// Run one reconciliation cycle and report its outcome
    pub async fn sync_once(&self) -> Result<CycleReport, SyncError> {
        let selection = self.sync_selection().await;
        match self.engine.run_cycle(&selection).await {
            Ok(report) => {
                if report.has_downloads() {
                    self.usage_trigger.request(true);
                }
                self.notifier.emit(StatusEvent::SyncDone {
                    outcome: Outcome::Success,
                });
                Ok(report)
            }
            Err(e @ SyncError::SelectionInvalid { .. }) => {
                warn!(error = %e, "Selection invalid, retrying next interval");
                self.notifier.emit(StatusEvent::SyncInvalidSelection);
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "Reconciliation cycle failed");
                self.notifier.emit(StatusEvent::SyncDone {
                    outcome: Outcome::Failure,
                });
                Err(e)
            }
        }
    }

    /// Run a usage scan
    ///
    /// Without `forced`, stored counters are reused and `None` is returned.
    pub async fn scan_usage_once(&self, forced: bool) -> Result<Option<UsageCounters>, SyncError> {
        let stored = self
            .accounts
            .lock()
            .await
            .account(&self.identity)
            .is_some_and(|a| a.drive_usage.is_some());
        if stored && !forced {
            debug!("Stored usage is current, skipping scan");
            self.notifier.emit(StatusEvent::UsageDone {
                outcome: Outcome::Success,
            });
            return Ok(None);
        }

        match self.aggregator.scan().await {
            Ok((report, tree)) => {
                *self.usage.lock().await = Some(report.counters);
                match self.persist_scan(&tree, report.counters).await {
                    Ok(()) => {
                        self.notifier.emit(StatusEvent::UsageDone {
                            outcome: Outcome::Success,
                        });
                        Ok(Some(report.counters))
                    }
                    Err(e) => {
                        error!(error = %e, "Could not persist usage scan");
                        self.notifier.emit(StatusEvent::UsageDone {
                            outcome: Outcome::Failure,
                        });
                        Err(e)
                    }
                }
            }
            Err(failure) => {
                *self.usage.lock().await = Some(failure.counters);
                self.notifier.emit(StatusEvent::UsageDone {
                    outcome: Outcome::Failure,
                });
                Err(failure.error)
            }
        }
    }

    async fn persist_scan(&self, tree: &NamespaceTree, counters: UsageCounters) -> Result<(), SyncError> {
        self.snapshots
            .save(&self.identity, tree)
            .await
            .map_err(|e| SyncError::Snapshot(format!("{e:#}")))?;
        self.accounts
            .lock()
            .await
            .set_usage(&self.identity, counters)?;
        Ok(())
    }

    /// Dispatch one local change to its handler
    pub async fn handle_change(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Created(path) => match self.mutations.on_created(&path).await {
                Ok(CreateOutcome::UploadedDuplicate { id }) => {
                    warn!(path = %path.display(), id = %id, "Uploaded alongside a differing remote file");
                }
                Ok(outcome) => debug!(path = %path.display(), ?outcome, "Creation handled"),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not propagate creation"),
            },
            ChangeEvent::Moved { src, dst } => self.mutations.on_moved(&src, &dst).await,
            ChangeEvent::Deleted(path) => self.mutations.on_deleted(&path).await,
        }
    }

    // ------------------------------------------------------------------------
    // Background loops
    // ------------------------------------------------------------------------

    /// Reconcile, count down the interval one second at a time, repeat
    ///
    /// While paused the loop blocks at the gate, both before a cycle and
    /// between countdown ticks.
    pub async fn run_sync_loop(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Starting sync loop");

        loop {
            if !self.wait_gate(&shutdown).await {
                break;
            }
            // Outcome is reported through status events
            let _ = self.sync_once().await;

            for remaining in (1..=self.interval.as_secs()).rev() {
                self.notifier.emit(StatusEvent::SyncCountdown {
                    remaining_secs: remaining,
                });
                if !self.wait_gate(&shutdown).await {
                    info!("Sync loop terminated");
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = shutdown.cancelled() => {
                        info!("Sync loop terminated");
                        return;
                    }
                }
            }
        }

        info!("Sync loop terminated");
    }

    /// Run a usage scan whenever one is requested
    pub async fn run_usage_loop(&self, shutdown: CancellationToken) {
        info!("Starting usage loop");
        loop {
            tokio::select! {
                forced = self.usage_trigger.wait() => {
                    let _ = self.scan_usage_once(forced).await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Usage loop terminated");
    }

    /// Apply local changes one at a time, in arrival order
    pub async fn run_event_loop(
        &self,
        mut events: mpsc::Receiver<ChangeEvent>,
        shutdown: CancellationToken,
    ) {
        info!("Starting change event loop");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_change(event).await,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Change event loop terminated");
    }

    async fn wait_gate(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = self.gate.wait_enabled() => true,
            _ = shutdown.cancelled() => false,
        }
    }
}
