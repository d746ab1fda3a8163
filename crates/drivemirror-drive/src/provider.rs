//! Drive implementation of the IRemoteStore port
//!
//! Endpoints used (Drive v2):
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /drive/v2/files?q='<parent>' in parents and trashed=false` (paged) |
//! | create    | `POST /drive/v2/files` (metadata) or `POST /upload/drive/v2/files?uploadType=multipart` |
//! | patch     | `PATCH /drive/v2/files/<id>?addParents=..&removeParents=..` |
//! | trash     | `POST /drive/v2/files/<id>/trash` |
//! | download  | `GET /drive/v2/files/<id>?alt=media` |

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use drivemirror_core::domain::{Md5Checksum, RemoteId};
use drivemirror_core::ports::{
    IRemoteStore, NewRemoteItem, RemotePatch, RemoteRecord, StoreError,
};

use crate::client::DriveClient;
use crate::DriveError;

/// Fields requested for every file resource
const FILE_FIELDS: &str = "id,title,mimeType,md5Checksum,fileSize,parents(id)";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    items: Vec<FileResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    mime_type: String,
    md5_checksum: Option<String>,
    #[serde(default, deserialize_with = "size_from_string")]
    file_size: Option<u64>,
    #[serde(default)]
    parents: Vec<ParentRef>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParentRef {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: Vec<ParentRef>,
}

#[derive(Debug, Default, Serialize)]
struct PatchBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

/// Drive reports `fileSize` as a decimal string
fn size_from_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl TryFrom<FileResource> for RemoteRecord {
    type Error = DriveError;

    fn try_from(file: FileResource) -> Result<Self, Self::Error> {
        let invalid = |e: drivemirror_core::domain::DomainError| {
            DriveError::InvalidResponse(e.to_string())
        };
        Ok(RemoteRecord {
            id: RemoteId::new(file.id).map_err(invalid)?,
            title: file.title,
            mime_type: file.mime_type,
            md5_checksum: file
                .md5_checksum
                .map(Md5Checksum::new)
                .transpose()
                .map_err(invalid)?,
            file_size: file.file_size,
            parents: file
                .parents
                .into_iter()
                .map(|p| RemoteId::new(p.id))
                .collect::<Result<_, _>>()
                .map_err(invalid)?,
        })
    }
}

// ============================================================================
// DriveRemoteStore
// ============================================================================

/// `IRemoteStore` backed by the Drive REST API
pub struct DriveRemoteStore {
    client: DriveClient,
}

impl DriveRemoteStore {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    async fn list_all(&self, parent_id: &RemoteId) -> Result<Vec<RemoteRecord>, DriveError> {
        let query = format!("'{}' in parents and trashed=false", parent_id.as_str());
        let fields = format!("nextPageToken,items({FILE_FIELDS})");
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .request(Method::GET, "/drive/v2/files")
                .query(&[("q", query.as_str()), ("fields", fields.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = self.client.send_json(request).await?;
            for item in page.items {
                records.push(RemoteRecord::try_from(item)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(parent = %parent_id, count = records.len(), "Listed folder");
        Ok(records)
    }

    async fn create_entry(
        &self,
        item: &NewRemoteItem,
        content: Option<&[u8]>,
    ) -> Result<RemoteRecord, DriveError> {
        let metadata = FileMetadata {
            title: &item.title,
            mime_type: item.mime_type.as_deref(),
            parents: vec![ParentRef {
                id: item.parent_id.as_str().to_string(),
            }],
        };
        let metadata_json = serde_json::to_vec(&metadata)
            .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;

        let request = match content {
            None => self
                .client
                .request(Method::POST, "/drive/v2/files")
                .query(&[("fields", FILE_FIELDS)])
                .header(CONTENT_TYPE, "application/json")
                .body(metadata_json),
            Some(bytes) => {
                let boundary = format!("drivemirror-{:016x}", rand::random::<u64>());
                self.client
                    .request(Method::POST, "/upload/drive/v2/files")
                    .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/related; boundary={boundary}"),
                    )
                    .body(multipart_body(&boundary, &metadata_json, bytes))
            }
        };

        let file: FileResource = self.client.send_json(request).await?;
        let record = RemoteRecord::try_from(file)?;
        debug!(id = %record.id, title = %record.title, "Created remote entry");
        Ok(record)
    }

    async fn patch_entry(
        &self,
        id: &RemoteId,
        patch: &RemotePatch,
    ) -> Result<RemoteRecord, DriveError> {
        let mut request = self
            .client
            .request(Method::PATCH, &format!("/drive/v2/files/{}", id.as_str()))
            .query(&[("fields", FILE_FIELDS)]);
        if let Some(add) = &patch.add_parent {
            request = request.query(&[("addParents", add.as_str())]);
        }
        if let Some(remove) = &patch.remove_parent {
            request = request.query(&[("removeParents", remove.as_str())]);
        }
        let body = PatchBody {
            title: patch.title.as_deref(),
        };

        let file: FileResource = self.client.send_json(request.json(&body)).await?;
        RemoteRecord::try_from(file)
    }
}

/// Build a `multipart/related` body: JSON metadata part, then content part
fn multipart_body(boundary: &str, metadata: &[u8], content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait::async_trait]
impl IRemoteStore for DriveRemoteStore {
    #[tracing::instrument(skip(self))]
    async fn list(&self, parent_id: &RemoteId) -> Result<Vec<RemoteRecord>, StoreError> {
        Ok(self.list_all(parent_id).await?)
    }

    #[tracing::instrument(skip(self, content), fields(title = %item.title))]
    async fn create(
        &self,
        item: &NewRemoteItem,
        content: Option<&[u8]>,
    ) -> Result<RemoteRecord, StoreError> {
        Ok(self.create_entry(item, content).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn patch(&self, id: &RemoteId, patch: &RemotePatch) -> Result<RemoteRecord, StoreError> {
        Ok(self.patch_entry(id, patch).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn trash(&self, id: &RemoteId) -> Result<(), StoreError> {
        let request = self
            .client
            .request(Method::POST, &format!("/drive/v2/files/{}/trash", id.as_str()))
            .query(&[("fields", "id")]);
        self.client.send(request).await.map_err(StoreError::from)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn download(&self, id: &RemoteId) -> Result<Vec<u8>, StoreError> {
        let request = self
            .client
            .request(Method::GET, &format!("/drive/v2/files/{}", id.as_str()))
            .query(&[("alt", "media")]);
        let response = self.client.send(request).await.map_err(StoreError::from)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::from(DriveError::from(e)))?;
        debug!(id = %id, bytes = bytes.len(), "Downloaded file content");
        Ok(bytes.to_vec())
    }
}
