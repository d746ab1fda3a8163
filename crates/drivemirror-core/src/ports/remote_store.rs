//! Remote store port (driven/secondary port)
//!
//! The minimal surface of the cloud drive the engine needs: list a folder,
//! create an entry, patch its metadata, trash it and download its content.
//!
//! ## Design Notes
//!
//! - Unlike the other ports this one returns a typed [`StoreError`], since
//!   callers branch on the failure class (rate limit, not found, other).
//! - Records are port-level DTOs; [`RemoteRecord::into_node`] maps them to
//!   domain [`RemoteNode`]s.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{Md5Checksum, RemoteId};
use crate::domain::node::RemoteNode;

// ============================================================================
// Records
// ============================================================================

/// One entry as reported by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RemoteId,
    pub title: String,
    pub mime_type: String,
    pub md5_checksum: Option<Md5Checksum>,
    pub file_size: Option<u64>,
    /// Parent folder ids; entries usually have exactly one
    pub parents: Vec<RemoteId>,
}

impl RemoteRecord {
    /// Convert into a domain node, taking the first parent as the owner
    #[must_use]
    pub fn into_node(self) -> RemoteNode {
        RemoteNode {
            parent_id: self.parents.into_iter().next(),
            id: self.id,
            name: self.title,
            mime_type: self.mime_type,
            md5_checksum: self.md5_checksum,
            size: self.file_size.unwrap_or(0),
        }
    }
}

/// Metadata for an entry to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRemoteItem {
    pub title: String,
    /// `None` lets the remote store sniff the type from the content
    pub mime_type: Option<String>,
    pub parent_id: RemoteId,
}

impl NewRemoteItem {
    /// A folder named `title` under `parent_id`
    #[must_use]
    pub fn folder(title: impl Into<String>, parent_id: RemoteId) -> Self {
        Self {
            title: title.into(),
            mime_type: Some(crate::domain::node::FOLDER_MIME_TYPE.to_string()),
            parent_id,
        }
    }

    /// A file named `title` under `parent_id`
    #[must_use]
    pub fn file(title: impl Into<String>, parent_id: RemoteId) -> Self {
        Self {
            title: title.into(),
            mime_type: None,
            parent_id,
        }
    }
}

/// Metadata changes applied by `patch`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemotePatch {
    pub title: Option<String>,
    pub add_parent: Option<RemoteId>,
    pub remove_parent: Option<RemoteId>,
}

impl RemotePatch {
    /// Change only the title
    #[must_use]
    pub fn rename(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Move from one parent folder to another
    #[must_use]
    pub fn reparent(from: RemoteId, to: RemoteId) -> Self {
        Self {
            add_parent: Some(to),
            remove_parent: Some(from),
            ..Self::default()
        }
    }

    /// Whether the patch moves the entry to another folder
    #[must_use]
    pub fn is_reparent(&self) -> bool {
        self.add_parent.is_some() || self.remove_parent.is_some()
    }
}

// ============================================================================
// Failure classes
// ============================================================================

/// Failure classes the remote store reports
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Rate limit or quota exhausted, retryable
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The addressed entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else (network, server, malformed response)
    #[error("remote store error: {0}")]
    Other(String),
}

impl StoreError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

// ============================================================================
// Trait
// ============================================================================

#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// List the non-trashed children of `parent_id`
    async fn list(&self, parent_id: &RemoteId) -> Result<Vec<RemoteRecord>, StoreError>;

    /// Create an entry, uploading `content` for files
    async fn create(
        &self,
        item: &NewRemoteItem,
        content: Option<&[u8]>,
    ) -> Result<RemoteRecord, StoreError>;

    /// Apply metadata changes to `id`
    async fn patch(&self, id: &RemoteId, patch: &RemotePatch) -> Result<RemoteRecord, StoreError>;

    /// Move `id` to the trash
    async fn trash(&self, id: &RemoteId) -> Result<(), StoreError>;

    /// Fetch the binary content of `id`
    async fn download(&self, id: &RemoteId) -> Result<Vec<u8>, StoreError>;
}
