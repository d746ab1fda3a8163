//! Create, patch, trash and download

use serde_json::json;
use wiremock::matchers::{
    body_json, body_string_contains, header_regex, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, ResponseTemplate};

use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::{IRemoteStore, NewRemoteItem, RemotePatch, StoreError};

use crate::common::{error_json, file_json, folder_json, setup_drive_mock};

const MD5_N: &str = "fedcba9876543210fedcba9876543210";

fn id(s: &str) -> RemoteId {
    s.parse().unwrap()
}

#[tokio::test]
async fn create_folder_posts_metadata() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/drive/v2/files"))
        .and(body_json(json!({
            "title": "Docs",
            "mimeType": "application/vnd.google-apps.folder",
            "parents": [{ "id": "root" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(folder_json("F1", "Docs", "root")))
        .expect(1)
        .mount(&server)
        .await;

    let record = store
        .create(&NewRemoteItem::folder("Docs", RemoteId::root()), None)
        .await
        .unwrap();
    assert_eq!(record.id.as_str(), "F1");
}

#[tokio::test]
async fn upload_uses_multipart_related() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v2/files"))
        .and(query_param("uploadType", "multipart"))
        .and(header_regex("content-type", "^multipart/related; boundary=drivemirror-"))
        .and(body_string_contains(r#""title":"notes.txt""#))
        .and(body_string_contains("hello drive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "N1",
            "notes.txt",
            "F1",
            "text/plain",
            MD5_N,
            11,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let record = store
        .create(
            &NewRemoteItem::file("notes.txt", id("F1")),
            Some(b"hello drive"),
        )
        .await
        .unwrap();
    assert_eq!(record.id.as_str(), "N1");
    assert_eq!(record.file_size, Some(11));
}

#[tokio::test]
async fn rename_patches_title_only() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/drive/v2/files/N1"))
        .and(query_param_is_missing("addParents"))
        .and(query_param_is_missing("removeParents"))
        .and(body_json(json!({ "title": "notes2.txt" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "N1",
            "notes2.txt",
            "F1",
            "text/plain",
            MD5_N,
            11,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let record = store
        .patch(&id("N1"), &RemotePatch::rename("notes2.txt"))
        .await
        .unwrap();
    assert_eq!(record.title, "notes2.txt");
}

#[tokio::test]
async fn reparent_sends_add_and_remove_parents() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/drive/v2/files/N1"))
        .and(query_param("addParents", "F2"))
        .and(query_param("removeParents", "F1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "N1",
            "notes.txt",
            "F2",
            "text/plain",
            MD5_N,
            11,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let record = store
        .patch(&id("N1"), &RemotePatch::reparent(id("F1"), id("F2")))
        .await
        .unwrap();
    assert_eq!(record.parents, vec![id("F2")]);
}

#[tokio::test]
async fn trash_posts_to_trash_endpoint() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/drive/v2/files/N1/trash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "N1" })))
        .expect(1)
        .mount(&server)
        .await;

    store.trash(&id("N1")).await.unwrap();
}

#[tokio::test]
async fn trash_missing_file_is_not_found() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/drive/v2/files/GONE/trash"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(error_json(404, "notFound", "File not found")),
        )
        .mount(&server)
        .await;

    let err = store.trash(&id("GONE")).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn download_returns_media_bytes() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files/A1"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = store.download(&id("A1")).await.unwrap();
    assert_eq!(bytes, b"%PDF-1.4");
}
