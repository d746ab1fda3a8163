//! Local mirror helpers
//!
//! - Mapping between absolute local paths and drive-relative paths
//! - MD5 of local files, computed off the async runtime
//! - Atomic writes: content goes to a hidden partial file in the same
//!   directory and is renamed into place. The watcher ignores partial files,
//!   so a half-written download is never uploaded.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use drivemirror_core::domain::{DomainError, DrivePath, Md5Checksum};

use crate::SyncError;

/// File name prefix of in-progress downloads
pub const PARTIAL_PREFIX: &str = ".drivemirror-partial-";

const HASH_CHUNK: usize = 64 * 1024;

// ============================================================================
// MirrorRoot
// ============================================================================

/// The local directory that mirrors the drive root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRoot {
    root: PathBuf,
}

impl MirrorRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Local location of a drive path
    pub fn local_path(&self, drive_path: &DrivePath) -> PathBuf {
        drive_path
            .components()
            .fold(self.root.clone(), |acc, c| acc.join(c))
    }

    /// Drive path of a local location inside the mirror
    ///
    /// # Errors
    /// `PathNotInMirror` if `local` is outside the mirror root, `InvalidPath`
    /// for non-UTF-8 or `..` components.
    pub fn to_drive_path(&self, local: &Path) -> Result<DrivePath, DomainError> {
        let relative = local
            .strip_prefix(&self.root)
            .map_err(|_| DomainError::PathNotInMirror(local.display().to_string()))?;

        let mut drive_path = DrivePath::root();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| {
                        DomainError::InvalidPath(format!("non UTF-8 name in {}", local.display()))
                    })?;
                    drive_path = drive_path.join(name)?;
                }
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::InvalidPath(local.display().to_string()));
                }
            }
        }
        Ok(drive_path)
    }
}

// ============================================================================
// Partial files
// ============================================================================

/// Whether `path` names an in-progress download
pub fn is_partial_download(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PARTIAL_PREFIX))
}

fn partial_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{PARTIAL_PREFIX}{name}"))
}

// ============================================================================
// Content
// ============================================================================

/// MD5 of the file at `path`
pub async fn file_md5(path: &Path) -> Result<Md5Checksum, SyncError> {
    let owned = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || -> std::io::Result<[u8; 16]> {
        let mut file = std::fs::File::open(&owned)?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; HASH_CHUNK];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            context.consume(&buffer[..read]);
        }
        Ok(context.compute().0)
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

    Ok(Md5Checksum::from_digest(digest))
}

/// MD5 of an in-memory buffer
pub fn bytes_md5(data: &[u8]) -> Md5Checksum {
    Md5Checksum::from_digest(md5::compute(data).0)
}

/// Write `data` to `target` through a partial file and a rename
#[tracing::instrument(skip(data), fields(path = %target.display(), bytes = data.len()))]
pub async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = partial_path_for(target);
    tokio::fs::write(&partial, data).await?;
    if let Err(e) = tokio::fs::rename(&partial, target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }

    debug!("write complete");
    Ok(())
}
