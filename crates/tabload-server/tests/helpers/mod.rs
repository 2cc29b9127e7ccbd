//! Test helpers for tabload server integration tests
//!
//! This module provides utilities for:
//! - Building configuration without touching the process environment
//! - Assembling the router around a temporary upload root
//! - Hand-rolled `multipart/form-data` request bodies
//! - CSV fixtures for the iris table

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use tabload_server::{
    api,
    config::Config,
    db::Database,
    features::{uploads::UploadGate, FeatureState},
};

pub const BOUNDARY: &str = "tabload-test-boundary";

/// Header plus five rows that satisfy every constraint
pub const GOOD_IRIS_CSV: &str = "\
sepal_length,sepal_width,petal_length,petal_width,species
5.1,3.5,1.4,0.2,setosa
4.9,3.0,1.4,0.2,setosa
7.0,3.2,4.7,1.4,versicolor
6.4,3.2,4.5,1.5,versicolor
6.3,3.3,6.0,2.5,virginica
";

/// One row referencing a species that does not exist
pub const UNKNOWN_SPECIES_CSV: &str = "\
sepal_length,sepal_width,petal_length,petal_width,species
5.1,3.5,1.4,0.2,setosa
5.0,3.0,1.0,0.1,sanguinea
";

/// One row with the species left empty
pub const MISSING_SPECIES_CSV: &str = "\
sepal_length,sepal_width,petal_length,petal_width,species
5.1,3.5,1.4,0.2,
";

/// The same row twice
pub const DUPLICATE_ROWS_CSV: &str = "\
sepal_length,sepal_width,petal_length,petal_width,species
5.1,3.5,1.4,0.2,setosa
5.1,3.5,1.4,0.2,setosa
";

/// Configuration with dummy credentials rooted at `root`
pub fn test_config(root: &Path, mode: &str) -> Config {
    let root = root.to_string_lossy().into_owned();
    let env: HashMap<&str, String> = HashMap::from([
        ("PG_HOST", "127.0.0.1".to_string()),
        ("PG_DATABASE", "tabload_test".to_string()),
        ("PG_USER", "tabload".to_string()),
        ("PG_PASSWORD", "tabload".to_string()),
        ("PG_CONNECT_TIMEOUT", "1".to_string()),
        ("UPLOAD_DIR", root),
        ("INGEST_MODE", mode.to_string()),
    ]);

    Config::from_lookup(|key| env.get(key).cloned()).expect("test configuration is valid")
}

/// Router over `db`; the database is only contacted when a request needs it
pub async fn test_app(config: &Config, db: Database) -> Router {
    let gate = UploadGate::open(&config.uploads)
        .await
        .expect("upload root is writable");

    let state = FeatureState {
        db,
        gate: Arc::new(gate),
        ingest: config.ingest,
    };

    api::create_router(state, config)
}

/// Router whose database is never reachable in rejection-path tests
pub async fn offline_app(root: &Path) -> Router {
    let config = test_config(root, "values");
    let db = Database::new(&config.database);
    test_app(&config, db).await
}

/// A `file` part with a filename
pub fn file_part(filename: &str, content: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(content);
    part.extend_from_slice(b"\r\n");
    part
}

/// A plain form value
pub fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
        .into_bytes()
}

pub fn multipart_request(parts: Vec<Vec<u8>>, referer: Option<&str>) -> Request<Body> {
    let mut body: Vec<u8> = parts.concat();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(referer) = referer {
        builder = builder.header(header::REFERER, referer);
    }
    builder.body(Body::from(body)).expect("valid request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body")
        .to_vec()
}

pub fn stored_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .expect("readable upload root")
        .map(|entry| {
            entry
                .expect("readable entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
