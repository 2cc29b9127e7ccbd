//! tabload server library
//!
//! Accepts a CSV upload over HTTP, stores it under a fixed directory and
//! bulk-loads its rows into PostgreSQL. Foreign-key and not-null violations
//! come back as structured 422 responses.
//!
//! # Overview
//!
//! - **sql**: escaped `VALUES` fragments and the target table descriptions
//! - **db**: per-request sessions and the simple query runner
//! - **features**: upload gate, file server and ingestion
//! - **config**: environment-based configuration, built once at startup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabload_server::{api, config::Config, db::Database, features};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = features::FeatureState {
//!         db: Database::new(&config.database),
//!         gate: Arc::new(features::uploads::UploadGate::open(&config.uploads).await?),
//!         ingest: config.ingest,
//!     };
//!     let app = api::create_router(state, &config);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod sql;

// Re-export commonly used types
pub use error::AppError;
