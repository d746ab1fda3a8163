//! Remote node entity
//!
//! A `RemoteNode` is the engine's view of one entry in the remote store,
//! either a folder or a file.

use serde::{Deserialize, Serialize};

use super::newtypes::{Md5Checksum, RemoteId};

/// Content type the remote store assigns to folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Prefix shared by every type the remote store defines itself
const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Whether a folder or a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Folder,
    File,
}

impl NodeKind {
    /// Derive the kind from a content type tag
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME_TYPE {
            Self::Folder
        } else {
            Self::File
        }
    }
}

/// Whether `mime_type` names an online-only document (spreadsheet, form,
/// drawing, ...) that has no byte representation to download
#[must_use]
pub fn is_native_document(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_MIME_PREFIX) && mime_type != FOLDER_MIME_TYPE
}

/// One remote filesystem entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Unique id in the remote store
    pub id: RemoteId,
    /// Display name (the remote `title`)
    pub name: String,
    /// Parent folder id, `None` only for the synthetic root
    pub parent_id: Option<RemoteId>,
    /// Content type tag
    pub mime_type: String,
    /// MD5 of the content, files with binary content only
    pub md5_checksum: Option<Md5Checksum>,
    /// Size in bytes, zero for folders and native documents
    pub size: u64,
}

impl RemoteNode {
    /// Build a folder node
    #[must_use]
    pub fn folder(id: RemoteId, name: impl Into<String>, parent_id: Option<RemoteId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id,
            mime_type: FOLDER_MIME_TYPE.to_string(),
            md5_checksum: None,
            size: 0,
        }
    }

    /// The synthetic root node
    #[must_use]
    pub fn root() -> Self {
        Self::folder(RemoteId::root(), "Drive Root", None)
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_mime(&self.mime_type)
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind() == NodeKind::Folder
    }

    #[must_use]
    pub fn is_native_document(&self) -> bool {
        is_native_document(&self.mime_type)
    }
}
