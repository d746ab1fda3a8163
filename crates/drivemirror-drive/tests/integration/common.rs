//! Shared helpers for Drive API integration tests

use serde_json::{json, Value};
use wiremock::MockServer;

use drivemirror_drive::client::DriveClient;
use drivemirror_drive::provider::DriveRemoteStore;

/// Start a mock server and return a store pointed at it
pub async fn setup_drive_mock() -> (MockServer, DriveRemoteStore) {
    let server = MockServer::start().await;
    let client = DriveClient::with_base_url("test-access-token", server.uri());
    (server, DriveRemoteStore::new(client))
}

/// A folder resource as Drive returns it
pub fn folder_json(id: &str, title: &str, parent: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "mimeType": "application/vnd.google-apps.folder",
        "parents": [{ "id": parent }]
    })
}

/// A binary file resource as Drive returns it (`fileSize` is a string)
pub fn file_json(id: &str, title: &str, parent: &str, mime: &str, md5: &str, size: u64) -> Value {
    json!({
        "id": id,
        "title": title,
        "mimeType": mime,
        "md5Checksum": md5,
        "fileSize": size.to_string(),
        "parents": [{ "id": parent }]
    })
}

/// A Drive error envelope
pub fn error_json(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "error": {
            "errors": [{ "domain": "usageLimits", "reason": reason, "message": message }],
            "code": code,
            "message": message
        }
    })
}
