//! Upload form, upload gate and file server
//!
//! Commands write under the upload root; queries only ever read a direct
//! child of it.

pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{
    AcceptedName, CollisionPolicy, IncomingFile, UploadError, UploadGate, UploadRejection,
    UploadedFile,
};

pub use queries::{DownloadFileError, DownloadFileQuery};

pub use routes::uploads_routes;
