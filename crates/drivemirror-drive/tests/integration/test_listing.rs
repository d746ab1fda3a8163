//! Folder listing: query shape, pagination, failure classes

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::{IRemoteStore, StoreError};

use crate::common::{error_json, file_json, folder_json, setup_drive_mock};

const MD5_A: &str = "0123456789abcdef0123456789abcdef";

#[tokio::test]
async fn list_sends_parent_query_and_maps_records() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("q", "'root' in parents and trashed=false"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                folder_json("F1", "Docs", "root"),
                file_json("B1", "b.mp3", "root", "audio/mpeg", MD5_A, 50),
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = store.list(&RemoteId::root()).await.unwrap();
    assert_eq!(records.len(), 2);

    let folder = &records[0];
    assert_eq!(folder.id.as_str(), "F1");
    assert_eq!(folder.mime_type, "application/vnd.google-apps.folder");
    assert!(folder.md5_checksum.is_none());
    assert_eq!(folder.parents[0].as_str(), "root");

    let file = &records[1];
    assert_eq!(file.title, "b.mp3");
    assert_eq!(file.file_size, Some(50));
    assert_eq!(file.md5_checksum.as_ref().unwrap().as_str(), MD5_A);
}

#[tokio::test]
async fn list_follows_next_page_token() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [folder_json("F1", "Docs", "root")],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [folder_json("F2", "Music", "root")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = store.list(&RemoteId::root()).await.unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["F1", "F2"]);
}

#[tokio::test]
async fn empty_folder_lists_nothing() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let records = store.list(&"F9".parse().unwrap()).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn rate_limit_reason_on_403_is_rate_limited() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(error_json(403, "userRateLimitExceeded", "User Rate Limit Exceeded")),
        )
        .mount(&server)
        .await;

    let err = store.list(&RemoteId::root()).await.unwrap_err();
    assert!(err.is_rate_limited(), "got {err:?}");
}

#[tokio::test]
async fn status_429_is_rate_limited() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = store.list(&RemoteId::root()).await.unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn plain_403_and_404_and_500_are_classified() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("q", "'A' in parents and trashed=false"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(error_json(403, "forbidden", "no access")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("q", "'B' in parents and trashed=false"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(error_json(404, "notFound", "File not found")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("q", "'C' in parents and trashed=false"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(&server)
        .await;

    let a = store.list(&"A".parse().unwrap()).await.unwrap_err();
    assert!(matches!(a, StoreError::Other(_)), "got {a:?}");
    let b = store.list(&"B".parse().unwrap()).await.unwrap_err();
    assert!(matches!(b, StoreError::NotFound(_)), "got {b:?}");
    let c = store.list(&"C".parse().unwrap()).await.unwrap_err();
    assert!(matches!(c, StoreError::Other(_)), "got {c:?}");
}

#[tokio::test]
async fn malformed_body_is_other_error() {
    let (server, store) = setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = store.list(&RemoteId::root()).await.unwrap_err();
    assert!(matches!(err, StoreError::Other(_)));
}
