//! End-to-end download tests
//!
//! Runs the coordinator and HTTP routes against a fake yt-dlp script.
//! Everything lives in one test function: the script is written and then
//! executed, and concurrent tests forking while it is open for writing make
//! exec fail with ETXTBSY.

#![cfg(unix)]

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestLibrary;
use musichub_server::catalogue_store::{CatalogueStore, DownloadStatus, NewCatalogueItem};
use musichub_server::download_manager::{DownloadError, MetadataResolver};
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

#[tokio::test]
async fn downloads_through_fake_ytdlp() {
    let library = TestLibrary::new();
    let coordinator = &library.coordinator;

    // Successful download with metadata from the tool
    let item = coordinator.request_download("https://fake/ok").await.unwrap();
    assert_eq!(item.status, DownloadStatus::Complete);
    assert_eq!(item.file_path.as_deref(), Some("media/1.mp3"));
    assert_eq!(item.title, "Fake Song");
    assert_eq!(item.artist, "Fake Channel");
    assert_eq!(item.duration_seconds, Some(61));
    assert_eq!(item.thumbnail_url.as_deref(), Some("https://img/fake.jpg"));
    assert!(library.root.path().join("media/1.mp3").is_file());

    // Tool failure is recorded with its last stderr line
    let item = coordinator
        .request_download("https://fake/broken")
        .await
        .unwrap();
    assert_eq!(item.status, DownloadStatus::Error);
    assert_eq!(
        item.error_message.as_deref(),
        Some("download failed: ERROR: HTTP Error 403: Forbidden")
    );
    assert!(item.file_path.is_none());

    // Metadata failure creates nothing
    let err = coordinator
        .request_download("https://fake/unsupported")
        .await
        .unwrap_err();
    match err {
        DownloadError::MetadataResolution(reason) => {
            assert!(reason.contains("Unsupported URL"), "{}", reason)
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(library
        .store
        .find_by_external_source("https://fake/unsupported")
        .unwrap()
        .is_none());

    // Fallback container is renamed to the configured extension
    let item = coordinator.request_download("https://fake/m4a").await.unwrap();
    assert_eq!(item.status, DownloadStatus::Complete);
    let file_path = item.file_path.unwrap();
    assert!(file_path.ends_with(".mp3"));
    assert!(library.root.path().join(&file_path).is_file());

    // Success without output is a failure
    let item = coordinator
        .request_download("https://fake/silent")
        .await
        .unwrap();
    assert_eq!(item.status, DownloadStatus::Error);
    assert!(item
        .error_message
        .unwrap()
        .starts_with("output file not found after download"));

    // Metadata timeout
    let impatient = library.impatient_ytdlp(Duration::from_secs(1));
    let err = impatient.resolve("https://fake/slow").await.unwrap_err();
    assert_eq!(
        err,
        DownloadError::MetadataResolution("metadata resolution timed out after 1s".to_string())
    );

    // HTTP surface over the same library
    let app = library.app();
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/songs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let songs: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(songs.as_array().unwrap().len(), 4);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/stream/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"audio");

    // Retry of a failed item through the HTTP route is accepted
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/add")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url": "https://fake/silent"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Unfinished work is failed when the store is reopened after a restart
    let left_behind = library
        .store
        .create_item(&NewCatalogueItem::pending("https://fake/left-behind"))
        .unwrap();
    let reopened = TestLibrary::open_store(library.root.path());
    assert!(reopened.fail_unfinished("interrupted by server restart").unwrap() >= 1);
    let item = reopened.get_item(left_behind.id).unwrap().unwrap();
    assert_eq!(item.status, DownloadStatus::Error);
    assert_eq!(
        item.error_message.as_deref(),
        Some("interrupted by server restart")
    );
}
