//! Shared control primitives
//!
//! One instance of each is created by the coordinator and handed to the
//! components that need it:
//!
//! - [`SyncLock`] serializes reconciliation, usage scans and local mutation
//!   handlers, and owns the namespace tree they share
//! - [`SyncGate`] is the user-controlled pause switch
//! - [`StatusNotifier`] broadcasts [`StatusEvent`]s to any subscriber
//! - [`UsageTrigger`] wakes the usage loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex, MutexGuard, Notify};
use tracing::debug;

use drivemirror_core::domain::NamespaceTree;
use drivemirror_core::ports::StatusEvent;

/// Capacity of the status broadcast channel
const STATUS_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// SyncLock
// ============================================================================

/// Mutual exclusion for everything that touches remote or mirror state
#[derive(Clone)]
pub struct SyncLock {
    tree: Arc<Mutex<NamespaceTree>>,
}

impl SyncLock {
    pub fn new(tree: NamespaceTree) -> Self {
        Self {
            tree: Arc::new(Mutex::new(tree)),
        }
    }

    /// Wait for exclusive access
    pub async fn lock(&self) -> MutexGuard<'_, NamespaceTree> {
        self.tree.lock().await
    }

    /// Copy of the tree taken under the lock
    pub async fn tree_snapshot(&self) -> NamespaceTree {
        self.tree.lock().await.clone()
    }
}

// ============================================================================
// SyncGate
// ============================================================================

/// Pause switch checked by the reconciliation loop
#[derive(Clone)]
pub struct SyncGate {
    tx: Arc<watch::Sender<bool>>,
}

impl SyncGate {
    pub fn new(enabled: bool) -> Self {
        let (tx, _rx) = watch::channel(enabled);
        Self { tx: Arc::new(tx) }
    }

    pub fn enable(&self) {
        self.tx.send_replace(true);
        debug!("Sync enabled");
    }

    pub fn disable(&self) {
        self.tx.send_replace(false);
        debug!("Sync paused");
    }

    pub fn is_enabled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the gate is open
    pub async fn wait_enabled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// StatusNotifier
// ============================================================================

/// Broadcast sender for status events; sending never blocks
#[derive(Clone)]
pub struct StatusNotifier {
    tx: broadcast::Sender<StatusEvent>,
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish `event`; dropped silently when nobody listens
    pub fn emit(&self, event: StatusEvent) {
        debug!(event = %event, "Status");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

// ============================================================================
// UsageTrigger
// ============================================================================

/// Wake-up signal for the usage loop
///
/// A forced request makes the next scan run even when stored counters exist
/// and nothing was downloaded since.
#[derive(Default)]
pub struct UsageTrigger {
    notify: Notify,
    forced: AtomicBool,
}

impl UsageTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a scan. Requests made while no one waits are kept.
    pub fn request(&self, forced: bool) {
        if forced {
            self.forced.store(true, Ordering::SeqCst);
        }
        self.notify.notify_one();
    }

    /// Wait for a request; returns whether any pending request was forced
    pub async fn wait(&self) -> bool {
        self.notify.notified().await;
        self.forced.swap(false, Ordering::SeqCst)
    }
}
