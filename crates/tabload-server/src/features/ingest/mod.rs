//! Loading stored uploads into the target table
//!
//! - `commands/bulk_insert.rs` - one multi-row `INSERT` per call, with
//!   constraint failures classified
//! - `commands/import_file.rs` - picks `COPY` or bulk insert by
//!   [`IngestionMode`]

pub mod commands;

pub use commands::{bulk_insert, import_file};

pub use commands::{
    BulkInsertError, BulkInsertReport, BulkInsertSpec, DatabaseOutcome, ImportError,
    ImportFileCommand, ImportOutcome, IngestionMode,
};
