use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::config::Config;
use crate::db::Database;
use crate::features::{self, FeatureState};
use crate::middleware;

/// Create the application router with all routes and middleware
pub fn create_router(state: FeatureState, config: &Config) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(state.db.clone());

    Router::new()
        .merge(health)
        .merge(features::router(state))
        .layer(DefaultBodyLimit::max(config.uploads.max_bytes))
        .layer(middleware::tracing_layer())
}

/// Health check handler
async fn health_check(State(db): State<Database>) -> Result<Response, StatusCode> {
    match db.health_check().await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}
