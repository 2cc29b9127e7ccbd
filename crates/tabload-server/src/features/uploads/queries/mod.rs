pub mod download;

pub use download::{DownloadFileError, DownloadFileQuery};
