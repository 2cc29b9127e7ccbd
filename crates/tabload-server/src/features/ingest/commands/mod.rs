pub mod bulk_insert;
pub mod import_file;

pub use bulk_insert::{BulkInsertError, BulkInsertReport, BulkInsertSpec, DatabaseOutcome};
pub use import_file::{ImportError, ImportFileCommand, ImportOutcome, IngestionMode};
