use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, Request, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};

use super::{
    commands::{upload, IncomingFile, UploadError},
    queries::{download, DownloadFileQuery},
};
use crate::error::AppError;
use crate::features::ingest::{import_file, ImportFileCommand, ImportOutcome};
use crate::features::FeatureState;

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Upload new File</title>
  </head>
  <body>
    <h1>Upload new File</h1>
    <form method="post" enctype="multipart/form-data">
      <input type="file" name="file">
      <input type="submit" value="Upload">
    </form>
  </body>
</html>
"#;

pub fn uploads_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(upload_form).post(upload_file))
        .route("/uploads/:filename", get(download_file))
}

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

#[tracing::instrument(skip(state, headers, multipart))]
async fn upload_file(
    State(state): State<FeatureState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let incoming = read_file_field(&mut multipart).await?;

    let stored = match upload::handle(&state.gate, incoming).await {
        Ok(stored) => stored,
        Err(UploadError::Rejected(rejection)) => {
            tracing::info!(reason = %rejection, "Upload rejected");
            return Ok(redirect_back(&headers).into_response());
        },
        Err(e) => return Err(e.into()),
    };

    let command = ImportFileCommand {
        path: stored.stored_path.clone(),
        table: state.ingest.table,
        mode: state.ingest.mode,
    };

    match import_file::handle(&state.db, command).await? {
        ImportOutcome::Loaded { rows } => {
            tracing::info!(
                file = %stored.sanitized_name,
                checksum = %stored.checksum,
                rows = ?rows,
                "File uploaded and imported"
            );
            Ok(Redirect::to("/").into_response())
        },
        ImportOutcome::Violation(violation) => Ok(violation.into_response()),
    }
}

/// The first `file` part that carries a filename; its bytes are buffered
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<IncomingFile>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A `file` part without a filename is a plain form value, not an upload
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content = field.bytes().await?;
        return Ok(Some(IncomingFile {
            filename,
            content: content.to_vec(),
        }));
    }
    Ok(None)
}

/// 303 back to the page the form was posted from
fn redirect_back(headers: &HeaderMap) -> Redirect {
    Redirect::to(&referer_target(headers))
}

/// Path and query of the `Referer`, or `/`
fn referer_target(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Uri>().ok())
        .and_then(|uri| uri.path_and_query().map(|pq| pq.as_str().to_string()))
        .filter(|target| target.starts_with('/') && !target.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

#[tracing::instrument(skip(state, request))]
async fn download_file(
    State(state): State<FeatureState>,
    Path(filename): Path<String>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let query = DownloadFileQuery { filename };
    Ok(download::handle(state.gate.root(), query, request).await?)
}
