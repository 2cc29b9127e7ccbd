//! Integration tests for the upload form, upload gate and file server
//!
//! These tests verify:
//! - The form is served at `/`
//! - Rejected uploads redirect without storing anything or touching the database
//! - Stored files are served back by name
//! - Traversal attempts are refused

use axum::http::{header, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

mod helpers;

use helpers::*;

#[tokio::test]
async fn test_upload_form_is_served() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains(r#"<input type="file" name="file">"#));
}

#[tokio::test]
async fn test_disallowed_extension_redirects_without_storing() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let request = multipart_request(vec![file_part("data.png", b"\x89PNG\r\n")], None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert!(stored_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_rejection_redirects_to_referer() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let request = multipart_request(
        vec![file_part("notes.exe", b"MZ")],
        Some("http://localhost:8000/?retry=1"),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/?retry=1");
}

#[tokio::test]
async fn test_empty_filename_redirects_without_storing() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let request = multipart_request(vec![file_part("", b"")], None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(stored_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_missing_file_part_redirects() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let request = multipart_request(vec![text_part("comment", "hello")], None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(stored_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_file_field_without_filename_is_missing_file() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let request = multipart_request(vec![text_part("file", "data.csv")], None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(stored_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_name_without_safe_form_redirects() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let request = multipart_request(vec![file_part("../.csv", b"a,b\n")], None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(stored_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_stored_file_is_served() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("data.csv"), GOOD_IRIS_CSV).unwrap();
    let app = offline_app(root.path()).await;

    let response = app.oneshot(get("/uploads/data.csv")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, GOOD_IRIS_CSV.as_bytes());
}

#[tokio::test]
async fn test_missing_stored_file_is_not_found() {
    let root = TempDir::new().unwrap();
    let app = offline_app(root.path()).await;

    let response = app.oneshot(get("/uploads/absent.csv")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"]["status"], 404);
}

#[tokio::test]
async fn test_traversal_is_refused() {
    let outer = TempDir::new().unwrap();
    let root = outer.path().join("uploads");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(outer.path().join("secret.csv"), "top,secret\n").unwrap();
    let app = offline_app(&root).await;

    for uri in [
        "/uploads/..%2Fsecret.csv",
        "/uploads/..",
        "/uploads/%2E%2E",
        "/uploads/..%5Csecret.csv",
        "/uploads/.hidden.csv",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_oversized_upload_is_refused() {
    let root = TempDir::new().unwrap();
    let mut config = test_config(root.path(), "values");
    config.uploads.max_bytes = 64;
    let db = tabload_server::db::Database::new(&config.database);
    let app = test_app(&config, db).await;

    let request = multipart_request(vec![file_part("data.csv", &[b'x'; 1024])], None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(stored_files(root.path()).is_empty());
}
