use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use sqlx::Connection;

use super::bulk_insert::{self, BulkInsertError, BulkInsertSpec, DatabaseOutcome};
use crate::db::{simple_query, Database, DbError, QueryOptions, Session};
use crate::features::shared::error_helpers::ConstraintViolation;
use crate::sql::{EscapeError, LiteralEscaper, PgEscaper, Row, RowError, SqlValue, TableSchema};

/// How a stored upload reaches the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestionMode {
    /// The database server reads the stored file from its own filesystem
    #[default]
    ServerCopy,
    /// The stored bytes are streamed over the connection with `COPY FROM STDIN`
    ClientCopy,
    /// Rows are parsed here and sent as one bulk `INSERT`
    Values,
}

impl FromStr for IngestionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server-copy" | "server_copy" | "copy" => Ok(IngestionMode::ServerCopy),
            "client-copy" | "client_copy" | "stdin" => Ok(IngestionMode::ClientCopy),
            "values" | "insert" => Ok(IngestionMode::Values),
            other => Err(format!(
                "unknown ingestion mode '{}' (expected server-copy, client-copy or values)",
                other
            )),
        }
    }
}

impl fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestionMode::ServerCopy => "server-copy",
            IngestionMode::ClientCopy => "client-copy",
            IngestionMode::Values => "values",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ImportFileCommand {
    pub path: PathBuf,
    pub table: &'static TableSchema,
    pub mode: IngestionMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// Committed; the count is unknown for server-side `COPY`
    Loaded { rows: Option<u64> },
    Violation(ConstraintViolation),
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Failed to read uploaded file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: {source}")]
    Record {
        line: u64,
        #[source]
        source: RowError,
    },

    #[error("Stored path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("Failed to quote statement parts: {0}")]
    Escape(#[from] EscapeError),

    #[error(transparent)]
    BulkInsert(BulkInsertError),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<BulkInsertError> for ImportError {
    fn from(err: BulkInsertError) -> Self {
        match err {
            BulkInsertError::Unclassified(e) => ImportError::Database(e),
            other => ImportError::BulkInsert(other),
        }
    }
}

/// `COPY <table>(<cols>) FROM '<path>' DELIMITER ',' CSV HEADER;`
pub fn server_copy_statement(table: &TableSchema, path: &str) -> Result<String, EscapeError> {
    let path = PgEscaper.quote_literal(&SqlValue::from(path))?;
    Ok(format!(
        "COPY {}({}) FROM {} DELIMITER ',' CSV HEADER;",
        table.qualified_name(&PgEscaper)?,
        table.column_list(&PgEscaper)?,
        path
    ))
}

pub fn client_copy_statement(table: &TableSchema) -> Result<String, EscapeError> {
    Ok(format!(
        "COPY {}({}) FROM STDIN WITH (FORMAT csv, DELIMITER ',', HEADER true)",
        table.qualified_name(&PgEscaper)?,
        table.column_list(&PgEscaper)?
    ))
}

#[tracing::instrument(skip(db, command), fields(path = %command.path.display(), table = %command.table.display_name(), mode = %command.mode))]
pub async fn handle(db: &Database, command: ImportFileCommand) -> Result<ImportOutcome, ImportError> {
    let outcome = match command.mode {
        IngestionMode::ServerCopy => server_copy(db, &command).await?,
        IngestionMode::ClientCopy => client_copy(db, &command).await?,
        IngestionMode::Values => insert_values(db, &command).await?,
    };

    match &outcome {
        ImportOutcome::Loaded { rows } => tracing::info!(rows = ?rows, "Import committed"),
        ImportOutcome::Violation(v) => tracing::warn!(kind = %v.kind, "Import rejected"),
    }
    Ok(outcome)
}

async fn server_copy(db: &Database, command: &ImportFileCommand) -> Result<ImportOutcome, ImportError> {
    let path = command
        .path
        .to_str()
        .ok_or_else(|| ImportError::NonUtf8Path(command.path.clone()))?;
    let statement = server_copy_statement(command.table, path)?;

    match simple_query(db, &statement, QueryOptions::command()).await {
        Ok(_) => Ok(ImportOutcome::Loaded { rows: None }),
        Err(e) => classify(e),
    }
}

async fn client_copy(db: &Database, command: &ImportFileCommand) -> Result<ImportOutcome, ImportError> {
    let statement = client_copy_statement(command.table)?;
    let data = tokio::fs::read(&command.path).await?;

    let mut session = db.session().await?;
    let result = stream_copy(&mut session, &statement, data).await;
    session.release().await;

    match result {
        Ok(rows) => Ok(ImportOutcome::Loaded { rows: Some(rows) }),
        Err(e) => classify(DbError::from(e)),
    }
}

async fn stream_copy(session: &mut Session, statement: &str, data: Vec<u8>) -> Result<u64, sqlx::Error> {
    let mut tx = session.conn().begin().await?;
    let mut copy = tx.copy_in_raw(statement).await?;

    let sent = copy.send(data).await.map(|_| ());
    if let Err(e) = sent {
        if let Err(abort_err) = copy.abort(e.to_string()).await {
            tracing::warn!(error = %abort_err, "Failed to abort COPY");
        }
        return Err(e);
    }

    // Constraint failures are reported when the server ends the copy
    let rows = copy.finish().await?;
    tx.commit().await?;
    Ok(rows)
}

async fn insert_values(db: &Database, command: &ImportFileCommand) -> Result<ImportOutcome, ImportError> {
    let data = tokio::fs::read(&command.path).await?;
    let rows = parse_rows(command.table, &data)?;

    if rows.is_empty() {
        tracing::info!("No data rows in upload");
        return Ok(ImportOutcome::Loaded { rows: Some(0) });
    }

    let spec = BulkInsertSpec::for_table(command.table, rows)?;
    let report = bulk_insert::handle(db, spec).await?;

    Ok(match report.outcome {
        DatabaseOutcome::Success { rows_affected } => ImportOutcome::Loaded {
            rows: rows_affected,
        },
        DatabaseOutcome::Failure(violation) => ImportOutcome::Violation(violation),
    })
}

/// Parse a headed CSV body into rows for `table`
pub fn parse_rows(table: &TableSchema, data: &[u8]) -> Result<Vec<Row>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(csv::Position::line).unwrap_or_default();
        let row = table
            .parse_record(&record)
            .map_err(|source| ImportError::Record { line, source })?;
        rows.push(row);
    }
    Ok(rows)
}

fn classify(err: DbError) -> Result<ImportOutcome, ImportError> {
    match err.as_sqlx().and_then(ConstraintViolation::classify) {
        Some(violation) => Ok(ImportOutcome::Violation(violation)),
        None => Err(ImportError::Database(err)),
    }
}
