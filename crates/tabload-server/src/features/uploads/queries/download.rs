use std::io;
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::features::shared::validation::{validate_served_name, ServedNameError};

#[derive(Debug, Clone)]
pub struct DownloadFileQuery {
    /// Client-supplied and untrusted
    pub filename: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadFileError {
    #[error("Invalid filename: {0}")]
    InvalidName(#[from] ServedNameError),

    #[error("File not found")]
    NotFound,

    #[error("Failed to read stored file: {0}")]
    Io(#[from] io::Error),
}

impl DownloadFileQuery {
    pub fn validate(&self) -> Result<(), DownloadFileError> {
        validate_served_name(&self.filename)?;
        Ok(())
    }

    fn path_under(&self, root: &Path) -> PathBuf {
        root.join(&self.filename)
    }
}

/// Serve a stored upload with a content type guessed from its extension
#[tracing::instrument(skip(root, request))]
pub async fn handle(
    root: &Path,
    query: DownloadFileQuery,
    request: Request<Body>,
) -> Result<Response, DownloadFileError> {
    query.validate()?;

    let path = query.path_under(root);
    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Err(DownloadFileError::NotFound),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(DownloadFileError::NotFound),
        Err(e) => return Err(e.into()),
    }

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    tracing::debug!(path = %path.display(), status = %response.status(), "Served stored file");
    Ok(response.map(Body::new).into_response())
}
