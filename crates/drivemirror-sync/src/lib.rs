//! DriveMirror Sync - Mirror synchronization engine
//!
//! Provides:
//! - Bounded retry around every remote listing call
//! - Periodic remote-to-local reconciliation (pull, then prune)
//! - Local-to-remote propagation of filesystem change events
//! - Storage usage aggregation that also fills the namespace tree
//!
//! ## Modules
//!
//! - [`gateway`] - retrying listing calls and live path resolution
//! - [`reconcile`] - the pull/prune cycle
//! - [`mutation`] - create/move/delete handlers for local changes
//! - [`usage`] - usage scan and namespace tree population
//! - [`control`] - the shared lock, pause gate, status channel and usage trigger
//! - [`coordinator`] - wires the above into background loops
//! - [`watcher`] - `notify`-based change event source
//! - [`filesystem`] - mirror path mapping, checksums, atomic writes

pub mod control;
pub mod coordinator;
pub mod filesystem;
pub mod gateway;
pub mod mutation;
pub mod reconcile;
pub mod usage;
pub mod watcher;

use drivemirror_core::accounts::AccountsError;
use drivemirror_core::domain::errors::DomainError;
use drivemirror_core::ports::StoreError;
use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The entry does not exist remotely
    #[error("Not found on drive: {0}")]
    NotFound(String),

    /// The retry budget ran out; the remote state is unknown
    #[error("Query failed after {attempts} attempts listing {parent}: {last_error}")]
    QueryFailed {
        parent: String,
        attempts: u32,
        last_error: StoreError,
    },

    /// The remote store rejected an upload, rename, move or trash
    #[error("Remote {operation} failed for {path}: {reason}")]
    MutationFailed {
        operation: &'static str,
        path: String,
        reason: String,
    },

    /// Fetching file content failed
    #[error("Download of {path} failed: {reason}")]
    DownloadFailed { path: String, reason: String },

    /// A selected folder no longer resolves to its recorded id
    #[error("Selection {path} no longer resolves to folder {id}")]
    SelectionInvalid { path: String, id: String },

    /// Persisted configuration is unreadable or malformed
    #[error("Configuration load failed: {0}")]
    ConfigLoadFailed(String),

    /// Persisted configuration could not be written
    #[error("Configuration save failed: {0}")]
    ConfigSaveFailed(String),

    /// Namespace snapshot could not be read or written
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Whether this error means "remote state unknown"
    pub fn is_query_failed(&self) -> bool {
        matches!(self, Self::QueryFailed { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<AccountsError> for SyncError {
    fn from(err: AccountsError) -> Self {
        match err {
            AccountsError::SaveFailed { .. } => Self::ConfigSaveFailed(err.to_string()),
            other => Self::ConfigLoadFailed(other.to_string()),
        }
    }
}
