//! Remote-to-local reconciliation
//!
//! One cycle, run under the [`SyncLock`]:
//!
//! 1. Validate every selection entry against the live remote namespace
//! 2. Pull: walk the selected folders and download files that have no local
//!    copy. A local file whose MD5 differs from the remote one is left alone
//!    (conflict, logged and counted).
//! 3. Prune: walk the mirror directory and delete local entries whose path no
//!    longer resolves remotely. A listing that exhausted its retries aborts
//!    the prune instead of deleting anything.
//!
//! Pausing through the [`SyncGate`] stops the pull at the next entry and
//! skips the prune for that cycle.

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use drivemirror_core::domain::{DrivePath, RemoteId, RemoteNode, SelectionEntry, SyncSelection};
use drivemirror_core::ports::StatusEvent;

use crate::control::{StatusNotifier, SyncGate, SyncLock};
use crate::filesystem::{file_md5, is_partial_download, write_atomic, MirrorRoot};
use crate::gateway::RemoteQueryGateway;
use crate::SyncError;

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>>;

// ============================================================================
// CycleReport
// ============================================================================

/// What one reconciliation cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub downloaded: u64,
    pub up_to_date: u64,
    /// Local files whose content differs from the remote copy
    pub conflicts: u64,
    pub directories_created: u64,
    /// Native documents skipped (no binary content)
    pub native_skipped: u64,
    /// Local entries deleted by the prune
    pub pruned: u64,
    /// The gate closed mid-pull; the prune did not run
    pub paused: bool,
}

impl CycleReport {
    /// Whether new content arrived, which invalidates stored usage
    pub fn has_downloads(&self) -> bool {
        self.downloaded > 0
    }
}

// ============================================================================
// ReconciliationEngine
// ============================================================================

/// Pull/prune engine for one mirror
pub struct ReconciliationEngine {
    gateway: Arc<RemoteQueryGateway>,
    mirror: MirrorRoot,
    lock: SyncLock,
    gate: SyncGate,
    notifier: StatusNotifier,
}

impl ReconciliationEngine {
    pub fn new(
        gateway: Arc<RemoteQueryGateway>,
        mirror: MirrorRoot,
        lock: SyncLock,
        gate: SyncGate,
        notifier: StatusNotifier,
    ) -> Self {
        Self {
            gateway,
            mirror,
            lock,
            gate,
            notifier,
        }
    }

    /// Run one full cycle for `selection`
    ///
    /// Emits `SyncStarted` once the selection is validated and a
    /// `SyncUpdate` per download. The caller reports the outcome.
    ///
    /// # Errors
    /// [`SyncError::SelectionInvalid`] before anything is touched,
    /// [`SyncError::QueryFailed`] or a download/IO error mid-cycle.
    #[tracing::instrument(skip_all, fields(mirror = %self.mirror.path().display()))]
    pub async fn run_cycle(&self, selection: &SyncSelection) -> Result<CycleReport, SyncError> {
        let _guard = self.lock.lock().await;

        self.validate_selection(selection).await?;
        self.notifier.emit(StatusEvent::SyncStarted);

        let mut report = CycleReport::default();
        tokio::fs::create_dir_all(self.mirror.path()).await?;

        self.pull(selection, &mut report).await?;
        if report.paused {
            info!("Sync paused during pull, skipping prune");
            return Ok(report);
        }
        self.prune(&mut report).await?;

        info!(
            downloaded = report.downloaded,
            up_to_date = report.up_to_date,
            conflicts = report.conflicts,
            pruned = report.pruned,
            "Reconciliation cycle complete"
        );
        Ok(report)
    }

    /// Check that every selected folder still resolves to its recorded id
    ///
    /// The root entry is always valid. All entries are checked.
    pub async fn validate_selection(&self, selection: &SyncSelection) -> Result<(), SyncError> {
        for entry in selection.entries() {
            let SelectionEntry::Folder { path, id } = entry else {
                continue;
            };
            let invalid = || SyncError::SelectionInvalid {
                path: path.to_string(),
                id: id.to_string(),
            };
            match self.gateway.locate_folder(path).await {
                Ok(folder) if folder.id == *id => {}
                Ok(folder) => {
                    warn!(path = %path, expected = %id, found = %folder.id, "Selected folder was replaced");
                    return Err(invalid());
                }
                Err(SyncError::NotFound(_)) => {
                    warn!(path = %path, id = %id, "Selected folder no longer exists");
                    return Err(invalid());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------------

    async fn pull(&self, selection: &SyncSelection, report: &mut CycleReport) -> Result<(), SyncError> {
        for entry in selection.entries() {
            if self.check_paused(report) {
                return Ok(());
            }
            match entry {
                SelectionEntry::Root => {
                    self.pull_folder(RemoteId::root(), DrivePath::root(), true, report)
                        .await?;
                }
                SelectionEntry::Folder { path, id } => {
                    // Files directly under the root are always mirrored
                    self.pull_folder(RemoteId::root(), DrivePath::root(), false, report)
                        .await?;
                    if report.paused {
                        return Ok(());
                    }
                    self.pull_folder(id.clone(), path.clone(), true, report)
                        .await?;
                }
            }
            if report.paused {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Mirror the folder `folder_id` at `path`. Subfolders are descended only
    /// when `recursive`.
    fn pull_folder<'a>(
        &'a self,
        folder_id: RemoteId,
        path: DrivePath,
        recursive: bool,
        report: &'a mut CycleReport,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            if self.check_paused(report) {
                return Ok(());
            }

            let local_dir = self.mirror.local_path(&path);
            if !tokio::fs::try_exists(&local_dir).await? {
                tokio::fs::create_dir_all(&local_dir).await?;
                report.directories_created += 1;
                debug!(path = %path, "Created local directory");
            }

            let children = self.gateway.list_children(&folder_id).await?;
            for child in children {
                if self.check_paused(report) {
                    return Ok(());
                }

                if child.is_folder() {
                    if !recursive {
                        continue;
                    }
                    let Ok(child_path) = path.join(&child.name) else {
                        warn!(parent = %path, name = %child.name, "Skipping folder with unusable name");
                        continue;
                    };
                    self.pull_folder(child.id.clone(), child_path, true, report)
                        .await?;
                    if report.paused {
                        return Ok(());
                    }
                } else if child.is_native_document() {
                    debug!(name = %child.name, mime = %child.mime_type, "Skipping native document");
                    report.native_skipped += 1;
                } else {
                    self.pull_file(&child, &path, report).await?;
                }
            }
            Ok(())
        })
    }

    async fn pull_file(
        &self,
        node: &RemoteNode,
        dir: &DrivePath,
        report: &mut CycleReport,
    ) -> Result<(), SyncError> {
        let Ok(drive_path) = dir.join(&node.name) else {
            warn!(parent = %dir, name = %node.name, "Skipping file with unusable name");
            return Ok(());
        };
        let local = self.mirror.local_path(&drive_path);

        match tokio::fs::metadata(&local).await {
            Ok(meta) if meta.is_file() => {
                let local_sum = file_md5(&local).await?;
                if node.md5_checksum.as_ref() == Some(&local_sum) {
                    report.up_to_date += 1;
                } else {
                    warn!(
                        path = %drive_path,
                        local = %local_sum,
                        remote = node.md5_checksum.as_ref().map(|c| c.as_str()).unwrap_or("-"),
                        "Local copy differs from remote, leaving it untouched"
                    );
                    report.conflicts += 1;
                }
                Ok(())
            }
            Ok(_) => {
                warn!(path = %drive_path, "A directory occupies the path of a remote file");
                report.conflicts += 1;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.notifier.emit(StatusEvent::SyncUpdate {
                    message: format!("Downloading {drive_path}"),
                });
                let content = self.gateway.store().download(&node.id).await.map_err(|e| {
                    SyncError::DownloadFailed {
                        path: drive_path.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                write_atomic(&local, &content).await?;
                report.downloaded += 1;
                info!(path = %drive_path, bytes = content.len(), "Downloaded");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_paused(&self, report: &mut CycleReport) -> bool {
        if !self.gate.is_enabled() {
            report.paused = true;
        }
        report.paused
    }

    // ------------------------------------------------------------------------
    // Prune
    // ------------------------------------------------------------------------

    async fn prune(&self, report: &mut CycleReport) -> Result<(), SyncError> {
        self.prune_dir(self.mirror.path().to_path_buf(), report).await
    }

    fn prune_dir<'a>(&'a self, dir: PathBuf, report: &'a mut CycleReport) -> WalkFuture<'a> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let local = entry.path();
                if is_partial_download(&local) {
                    continue;
                }
                let drive_path = match self.mirror.to_drive_path(&local) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(path = %local.display(), error = %e, "Skipping unmappable local entry");
                        continue;
                    }
                };
                let is_dir = entry.file_type().await?.is_dir();
                // A directory needs a remote folder; a same-named file does not count
                let remote = if is_dir {
                    self.gateway.locate_folder(&drive_path).await
                } else {
                    self.gateway.locate(&drive_path).await
                };

                match remote {
                    Ok(_) => {
                        if is_dir {
                            self.prune_dir(local, report).await?;
                        }
                    }
                    Err(SyncError::NotFound(_)) => {
                        info!(path = %drive_path, "Removed remotely, deleting local copy");
                        if is_dir {
                            tokio::fs::remove_dir_all(&local).await?;
                        } else {
                            tokio::fs::remove_file(&local).await?;
                        }
                        report.pruned += 1;
                    }
                    Err(e) => {
                        warn!(path = %drive_path, error = %e, "Remote state unknown, aborting prune");
                        return Err(e);
                    }
                }
            }
            Ok(())
        })
    }
}
