//! Server-specific error types

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;
use crate::features::ingest::{BulkInsertError, ImportError};
use crate::features::uploads::{DownloadFileError, UploadError};

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
            },
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::BadRequest(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Conflict(ref message) => (StatusCode::CONFLICT, message.clone()),
            AppError::Multipart(ref e) => {
                tracing::warn!("Rejected multipart body: {}", e);
                (e.status(), e.body_text())
            },
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            },
            AppError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An IO error occurred".to_string())
            },
        };

        let body = Json(ErrorBody {
            error: ErrorDetail {
                message: error_message,
                status: status.as_u16(),
            },
        });

        (status, body).into_response()
    }
}

impl From<UploadError> for AppError {
    /// Rejections are answered with a redirect before reaching here
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Rejected(rejection) => AppError::BadRequest(rejection.to_string()),
            UploadError::Conflict(_) => AppError::Conflict(err.to_string()),
            UploadError::OutsideRoot(_) => AppError::BadRequest(err.to_string()),
            UploadError::RootUnavailable { .. } => AppError::Internal(err.to_string()),
            UploadError::Io(e) => AppError::Io(e),
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Csv(_) | ImportError::Record { .. } => AppError::BadRequest(err.to_string()),
            ImportError::BulkInsert(BulkInsertError::Row { .. }) => {
                AppError::BadRequest(err.to_string())
            },
            ImportError::Database(e) => AppError::Database(e),
            ImportError::Io(e) => AppError::Io(e),
            ImportError::NonUtf8Path(_) | ImportError::Escape(_) | ImportError::BulkInsert(_) => {
                AppError::Internal(err.to_string())
            },
        }
    }
}

impl From<DownloadFileError> for AppError {
    fn from(err: DownloadFileError) -> Self {
        match err {
            DownloadFileError::InvalidName(_) => AppError::BadRequest(err.to_string()),
            DownloadFileError::NotFound => AppError::NotFound("File not found".to_string()),
            DownloadFileError::Io(e) => AppError::Io(e),
        }
    }
}
