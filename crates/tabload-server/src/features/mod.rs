//! Feature slices
//!
//! # Features
//!
//! - **uploads**: upload form, upload gate and file server
//! - **ingest**: bulk insert executor and file import
//! - **shared**: constraint classification and filename validation
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - operations that write (files or rows)
//! - `queries/` - read-only operations
//! - `routes.rs` - HTTP route definitions

pub mod ingest;
pub mod shared;
pub mod uploads;

use std::sync::Arc;

use axum::Router;

use crate::config::IngestConfig;
use crate::db::Database;
use uploads::UploadGate;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Source of per-request database sessions
    pub db: Database,
    /// Validates and stores uploads under the upload root
    pub gate: Arc<UploadGate>,
    /// Where and how stored uploads are loaded
    pub ingest: IngestConfig,
}

/// Creates the router with all feature routes mounted
///
/// - `/` - upload form and upload endpoint
/// - `/uploads/:filename` - stored files
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().merge(uploads::uploads_routes().with_state(state))
}
