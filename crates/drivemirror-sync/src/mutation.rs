//! Local-to-remote propagation
//!
//! Handlers for the three local change kinds. Each one takes the
//! [`SyncLock`] so it never interleaves with a reconciliation cycle or a
//! usage scan.
//!
//! | Local change | Remote effect |
//! |--------------|---------------|
//! | directory created | folder chain created where missing |
//! | file created | upload unless a same-named remote file has the same MD5 |
//! | moved within one directory | title patch |
//! | moved across directories | parent patch (plus title if the name changed) |
//! | deleted | entry trashed |
//!
//! Move and delete failures are logged and swallowed; the next
//! reconciliation cycle repairs the mirror.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use drivemirror_core::domain::{DrivePath, NodeKind, RemoteId};
use drivemirror_core::ports::{NewRemoteItem, RemotePatch};

use crate::control::SyncLock;
use crate::filesystem::{bytes_md5, MirrorRoot};
use crate::gateway::RemoteQueryGateway;
use crate::SyncError;

/// Result of handling a creation event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Folders were created remotely; `created` counts new links in the chain
    FolderCreated { created: usize },
    /// The whole folder chain already existed
    FolderExists,
    /// New remote file
    Uploaded { id: RemoteId },
    /// A same-named file with different content existed; a second remote
    /// file with the same name now sits next to it
    UploadedDuplicate { id: RemoteId },
    /// Remote file already holds identical content
    Unchanged,
    /// Nothing to do: the path vanished or is the mirror root
    Skipped,
}

// ============================================================================
// MutationHandlers
// ============================================================================

pub struct MutationHandlers {
    gateway: Arc<RemoteQueryGateway>,
    mirror: MirrorRoot,
    lock: SyncLock,
}

impl MutationHandlers {
    pub fn new(gateway: Arc<RemoteQueryGateway>, mirror: MirrorRoot, lock: SyncLock) -> Self {
        Self {
            gateway,
            mirror,
            lock,
        }
    }

    /// Propagate a created file or directory
    ///
    /// # Errors
    /// [`SyncError::MutationFailed`] when the parent folder of a file has no
    /// remote counterpart or the store rejects the call,
    /// [`SyncError::QueryFailed`] when a lookup ran out of retries.
    #[tracing::instrument(skip(self), fields(path = %local.display()))]
    pub async fn on_created(&self, local: &Path) -> Result<CreateOutcome, SyncError> {
        let _guard = self.lock.lock().await;

        let drive_path = self.mirror.to_drive_path(local)?;
        if drive_path.is_root() {
            return Ok(CreateOutcome::Skipped);
        }

        let meta = match tokio::fs::metadata(local).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Path vanished before it could be uploaded");
                return Ok(CreateOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            self.ensure_folder_chain(&drive_path).await
        } else {
            self.upload_file(local, &drive_path).await
        }
    }

    /// Propagate a rename or move; failures are logged only
    #[tracing::instrument(skip(self), fields(src = %src.display(), dst = %dst.display()))]
    pub async fn on_moved(&self, src: &Path, dst: &Path) {
        let _guard = self.lock.lock().await;
        if let Err(e) = self.apply_move(src, dst).await {
            warn!(error = %e, "Could not propagate move");
        }
    }

    /// Propagate a deletion by trashing the remote entry; failures are
    /// logged only
    #[tracing::instrument(skip(self), fields(path = %local.display()))]
    pub async fn on_deleted(&self, local: &Path) {
        let _guard = self.lock.lock().await;
        if let Err(e) = self.apply_delete(local).await {
            warn!(error = %e, "Could not propagate deletion");
        }
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    async fn ensure_folder_chain(&self, drive_path: &DrivePath) -> Result<CreateOutcome, SyncError> {
        let mut parent = RemoteId::root();
        let mut created = 0usize;

        for name in drive_path.components() {
            match self
                .gateway
                .find_child(&parent, name, Some(NodeKind::Folder))
                .await?
            {
                Some(folder) => parent = folder.id,
                None => {
                    let record = self
                        .gateway
                        .store()
                        .create(&NewRemoteItem::folder(name, parent.clone()), None)
                        .await
                        .map_err(|e| SyncError::MutationFailed {
                            operation: "create folder",
                            path: drive_path.to_string(),
                            reason: e.to_string(),
                        })?;
                    info!(name, id = %record.id, "Created remote folder");
                    parent = record.id;
                    created += 1;
                }
            }
        }

        Ok(if created == 0 {
            CreateOutcome::FolderExists
        } else {
            CreateOutcome::FolderCreated { created }
        })
    }

    async fn upload_file(&self, local: &Path, drive_path: &DrivePath) -> Result<CreateOutcome, SyncError> {
        let upload_failed = |reason: String| SyncError::MutationFailed {
            operation: "upload",
            path: drive_path.to_string(),
            reason,
        };
        let parent_path = drive_path.parent().unwrap_or_default();
        let name = drive_path
            .file_name()
            .ok_or_else(|| upload_failed("path has no file name".to_string()))?;

        let parent = match self.gateway.locate_folder(&parent_path).await {
            Ok(folder) => folder.id,
            Err(SyncError::NotFound(_)) => {
                return Err(upload_failed(format!(
                    "parent folder {parent_path} does not exist remotely"
                )));
            }
            Err(e) => return Err(e),
        };

        let existing = self
            .gateway
            .find_child(&parent, name, Some(NodeKind::File))
            .await?;

        let content = match tokio::fs::read(local).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CreateOutcome::Skipped),
            Err(e) => return Err(e.into()),
        };
        let local_sum = bytes_md5(&content);

        if let Some(remote) = &existing {
            if remote.md5_checksum.as_ref() == Some(&local_sum) {
                debug!(id = %remote.id, "Remote copy already identical");
                return Ok(CreateOutcome::Unchanged);
            }
            warn!(id = %remote.id, "Remote file with this name differs, uploading a second copy");
        }

        let record = self
            .gateway
            .store()
            .create(&NewRemoteItem::file(name, parent), Some(&content))
            .await
            .map_err(|e| upload_failed(e.to_string()))?;
        info!(id = %record.id, bytes = content.len(), "Uploaded file");

        Ok(match existing {
            Some(_) => CreateOutcome::UploadedDuplicate { id: record.id },
            None => CreateOutcome::Uploaded { id: record.id },
        })
    }

    // ------------------------------------------------------------------------
    // Move / delete
    // ------------------------------------------------------------------------

    async fn apply_move(&self, src: &Path, dst: &Path) -> Result<(), SyncError> {
        let src_path = self.mirror.to_drive_path(src)?;
        let dst_path = self.mirror.to_drive_path(dst)?;
        let (Some(src_name), Some(dst_name)) = (src_path.file_name(), dst_path.file_name()) else {
            return Ok(());
        };
        let src_parent = src_path.parent().unwrap_or_default();
        let dst_parent = dst_path.parent().unwrap_or_default();

        let entry = self.gateway.locate(&src_path).await?;

        let patch = if src_parent == dst_parent {
            RemotePatch::rename(dst_name)
        } else {
            let from = self.gateway.locate_folder(&src_parent).await?.id;
            let to = self.gateway.locate_folder(&dst_parent).await?.id;
            let mut patch = RemotePatch::reparent(from, to);
            if src_name != dst_name {
                patch.title = Some(dst_name.to_string());
            }
            patch
        };

        self.gateway
            .store()
            .patch(&entry.id, &patch)
            .await
            .map_err(|e| SyncError::MutationFailed {
                operation: "move",
                path: src_path.to_string(),
                reason: e.to_string(),
            })?;
        info!(id = %entry.id, from = %src_path, to = %dst_path, "Propagated move");
        Ok(())
    }

    async fn apply_delete(&self, local: &Path) -> Result<(), SyncError> {
        let drive_path = self.mirror.to_drive_path(local)?;
        if drive_path.is_root() {
            return Ok(());
        }
        let entry = self.gateway.locate(&drive_path).await?;
        self.gateway
            .store()
            .trash(&entry.id)
            .await
            .map_err(|e| SyncError::MutationFailed {
                operation: "trash",
                path: drive_path.to_string(),
                reason: e.to_string(),
            })?;
        info!(id = %entry.id, path = %drive_path, "Trashed remote entry");
        Ok(())
    }
}
