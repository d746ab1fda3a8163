//! Mirror directory watcher
//!
//! Wraps the `notify` crate and turns raw OS events into the three
//! [`ChangeEvent`] kinds the mutation handlers understand.
//!
//! ```text
//! inotify / kqueue
//!       │  (notify callback)
//!       ▼
//!  std mpsc  ──→  pairing thread (RenamePairer)  ──→  tokio mpsc
//!                                                        │
//!                                                        ▼
//!                                     SyncCoordinator::run_event_loop
//! ```
//!
//! inotify reports a rename inside the watched tree as `From`, `To` and then
//! `Both`, all sharing one tracker cookie. A rename across the boundary of
//! the tree only produces one half: `To` for a file moved in, `From` for a
//! file moved out. The pairing thread turns an unmatched `To` into
//! `Created` and a `From` whose `To` never arrives within
//! [`RENAME_PAIR_WINDOW`] into `Deleted`.
//!
//! Downloads land through a partial file that is renamed into place. Events
//! for partial files are dropped, and the final rename is reported as a
//! creation of the target. The upload handler then finds an identical remote
//! copy and does nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::filesystem::is_partial_download;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long a rename source waits for its destination half
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(500);

// ============================================================================
// ChangeEvent
// ============================================================================

/// A local change to propagate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Moved { src: PathBuf, dst: PathBuf },
    Deleted(PathBuf),
}

impl ChangeEvent {
    /// The path the change leaves behind (destination for moves)
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Deleted(p) => p,
            ChangeEvent::Moved { dst, .. } => dst,
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Recursive watcher feeding an mpsc channel
///
/// Dropping the watcher stops the pairing thread and closes the receiver.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create the watcher and the receiver its events arrive on
    ///
    /// # Errors
    /// Fails if the OS watcher or the pairing thread cannot be created.
    pub fn new() -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);
        let (raw_tx, raw_rx) = std_mpsc::channel::<notify::Event>();

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if raw_tx.send(event).is_err() {
                        warn!("Rename pairing thread has stopped");
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        std::thread::Builder::new()
            .name("drivemirror-watch".into())
            .spawn(move || pair_renames(raw_rx, tx, RENAME_PAIR_WINDOW))
            .context("Failed to spawn rename pairing thread")?;

        Ok((Self { watcher }, rx))
    }

    /// Watch `path` and everything below it
    ///
    /// # Errors
    /// Fails if the path does not exist or the watch limit is reached.
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Starting recursive watch");
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))
    }
}

/// Pairing loop run on its own thread until the watcher is dropped
fn pair_renames(
    raw: std_mpsc::Receiver<notify::Event>,
    tx: mpsc::Sender<ChangeEvent>,
    window: Duration,
) {
    let mut pairer = RenamePairer::new(window);
    loop {
        let received = raw.recv_timeout(window);
        let now = Instant::now();
        let mut changes = pairer.expire(now);
        match received {
            Ok(event) => changes.extend(pairer.push(&event, now)),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                changes.extend(pairer.drain());
                send_all(&tx, changes);
                break;
            }
        }
        if !send_all(&tx, changes) {
            break;
        }
    }
    debug!("Rename pairing thread stopped");
}

fn send_all(tx: &mpsc::Sender<ChangeEvent>, changes: Vec<ChangeEvent>) -> bool {
    for change in changes {
        if let Err(e) = tx.blocking_send(change) {
            warn!(error = %e, "Failed to send change event (receiver dropped)");
            return false;
        }
    }
    true
}

// ============================================================================
// RenamePairer
// ============================================================================

/// Matches rename halves by tracker cookie
///
/// A `From` is held until its `To` arrives or [`expire`](Self::expire)
/// finds it older than the window, at which point the path left the
/// watched tree and is reported as deleted.
pub struct RenamePairer {
    /// Unmatched rename sources keyed by tracker
    pending: HashMap<usize, (PathBuf, Instant)>,
    window: Duration,
}

impl RenamePairer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Feed one raw event and return the changes it settles
    pub fn push(&mut self, event: &notify::Event, now: Instant) -> Vec<ChangeEvent> {
        let tracker = event.attrs.tracker();
        match (&event.kind, tracker) {
            (EventKind::Modify(ModifyKind::Name(RenameMode::From)), Some(cookie)) => {
                if let Some(path) = event.paths.first() {
                    self.pending.insert(cookie, (path.clone(), now));
                }
                Vec::new()
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::To)), Some(cookie)) => {
                if self.pending.remove(&cookie).is_some() {
                    // Paired inside the tree; the Both event that follows is the move
                    Vec::new()
                } else {
                    moved_in(event)
                }
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::To)), None) => moved_in(event),
            (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), Some(cookie)) => {
                self.pending.remove(&cookie);
                map_notify_event(event).into_iter().collect()
            }
            _ => map_notify_event(event).into_iter().collect(),
        }
    }

    /// Report sources whose destination never showed up as deleted
    pub fn expire(&mut self, now: Instant) -> Vec<ChangeEvent> {
        let window = self.window;
        let expired: Vec<usize> = self
            .pending
            .iter()
            .filter(|(_, (_, seen))| now.duration_since(*seen) >= window)
            .map(|(cookie, _)| *cookie)
            .collect();
        expired
            .into_iter()
            .filter_map(|cookie| self.pending.remove(&cookie))
            .filter_map(|(path, _)| moved_out(path))
            .collect()
    }

    /// Report every pending source as deleted
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        self.pending
            .drain()
            .filter_map(|(_, (path, _))| moved_out(path))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Creation of a path that arrived from outside the tree
///
/// A directory brings its contents along without further events, so every
/// entry below it is reported too, parents before children.
fn moved_in(event: &notify::Event) -> Vec<ChangeEvent> {
    let Some(ChangeEvent::Created(root)) = map_notify_event(event) else {
        return Vec::new();
    };
    let mut changes = Vec::new();
    let mut stack = vec![root];
    while let Some(path) = stack.pop() {
        if path.is_dir() {
            match std::fs::read_dir(&path) {
                Ok(entries) => {
                    let mut children: Vec<PathBuf> = entries
                        .filter_map(|entry| entry.ok().map(|e| e.path()))
                        .filter(|child| !is_partial_download(child))
                        .collect();
                    children.sort();
                    stack.extend(children.into_iter().rev());
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Could not list moved-in directory"),
            }
        }
        changes.push(ChangeEvent::Created(path));
    }
    if changes.len() > 1 {
        debug!(count = changes.len(), "Directory moved into the watched tree");
    }
    changes
}

fn moved_out(path: PathBuf) -> Option<ChangeEvent> {
    if is_partial_download(&path) {
        return None;
    }
    debug!(path = %path.display(), "Rename source left the watched tree");
    Some(ChangeEvent::Deleted(path))
}

// ============================================================================
// Event mapping
// ============================================================================

/// Convert a single `notify::Event` into a [`ChangeEvent`]
///
/// - `Create(*)` -> `Created`
/// - `Modify(Name(Both))` with two paths -> `Moved`, or `Created` when the
///   source is a partial download
/// - `Modify(Name(To))` -> `Created` (moved in from outside)
/// - `Modify(Name(From))` -> `Deleted` (moved out; only reached without a
///   tracker, otherwise [`RenamePairer`] decides)
/// - `Remove(*)` -> `Deleted`
///
/// Everything else, and anything touching a partial file, is dropped.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            let path = paths.first()?;
            if is_partial_download(path) {
                return None;
            }
            debug!(path = %path.display(), kind = ?event.kind, "Mapped creation");
            Some(ChangeEvent::Created(path.clone()))
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            let src = paths[0].clone();
            let dst = paths[1].clone();
            if is_partial_download(&dst) {
                return None;
            }
            if is_partial_download(&src) {
                debug!(path = %dst.display(), "Download completed");
                return Some(ChangeEvent::Created(dst));
            }
            debug!(src = %src.display(), dst = %dst.display(), "Mapped Rename event");
            Some(ChangeEvent::Moved { src, dst })
        }

        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            let path = paths.first()?;
            if is_partial_download(path) {
                return None;
            }
            debug!(path = %path.display(), kind = ?event.kind, "Mapped removal");
            Some(ChangeEvent::Deleted(path.clone()))
        }

        _ => None,
    }
}
