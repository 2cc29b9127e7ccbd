//! SQL text construction
//!
//! - **values**: escaped literal groups for `VALUES` clauses
//! - **schema**: the fixed target tables and typed rows

pub mod schema;
pub mod values;

pub use schema::{ColumnDef, ColumnType, IrisRecord, RowError, SpeciesRecord, TableRow, TableSchema};
pub use values::{
    format_values, EscapeError, FormatError, LiteralEscaper, PgEscaper, Row, SqlValue, ValuesShape,
};
