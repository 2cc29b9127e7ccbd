use sqlx::{Connection, Executor};

use crate::db::{Database, DbError, Session};
use crate::features::shared::error_helpers::ConstraintViolation;
use crate::sql::{
    format_values, EscapeError, FormatError, PgEscaper, Row, RowError, TableRow, TableSchema,
    ValuesShape,
};

/// One multi-row `INSERT`
///
/// The executed text is `prefix_statement + " " + values + suffix_statement`;
/// the suffix is appended verbatim, so include its leading space.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkInsertSpec {
    pub prefix_statement: String,
    pub row_values: Vec<Row>,
    pub shape: ValuesShape,
    pub suffix_statement: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseOutcome {
    Success { rows_affected: Option<u64> },
    Failure(ConstraintViolation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkInsertReport {
    /// The statement as sent to the server
    pub statement: String,
    pub outcome: DatabaseOutcome,
}

impl BulkInsertReport {
    pub fn violation(&self) -> Option<&ConstraintViolation> {
        match &self.outcome {
            DatabaseOutcome::Failure(violation) => Some(violation),
            DatabaseOutcome::Success { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BulkInsertError {
    #[error("Bulk insert requires at least one row")]
    EmptyValues,

    #[error("Failed to format values: {0}")]
    Format(#[from] FormatError),

    #[error("Failed to quote identifier: {0}")]
    Escape(#[from] EscapeError),

    #[error("Row {row} does not fit the target table: {source}")]
    Row {
        row: usize,
        #[source]
        source: RowError,
    },

    #[error("Unclassified database error: {0}")]
    Unclassified(#[from] DbError),
}

impl BulkInsertSpec {
    pub fn new(prefix_statement: impl Into<String>, row_values: Vec<Row>) -> Self {
        Self {
            prefix_statement: prefix_statement.into(),
            row_values,
            shape: ValuesShape::default(),
            suffix_statement: String::new(),
        }
    }

    pub fn with_shape(mut self, shape: ValuesShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_suffix(mut self, suffix_statement: impl Into<String>) -> Self {
        self.suffix_statement = suffix_statement.into();
        self
    }

    /// Insert into every column of `table`, checking each row's types
    pub fn for_table(table: &TableSchema, row_values: Vec<Row>) -> Result<Self, BulkInsertError> {
        for (row, values) in row_values.iter().enumerate() {
            table
                .check_row(values)
                .map_err(|source| BulkInsertError::Row { row, source })?;
        }

        Ok(Self::new(table.insert_prefix(&PgEscaper)?, row_values).with_shape(table.shape()))
    }

    pub fn from_records<R, I>(records: I) -> Result<Self, BulkInsertError>
    where
        R: TableRow,
        I: IntoIterator<Item = R>,
    {
        let rows = records.into_iter().map(R::into_row).collect();
        Self::for_table(R::schema(), rows)
    }

    /// Compose the full statement text without touching the database
    pub fn statement(&self) -> Result<String, BulkInsertError> {
        if self.row_values.is_empty() {
            return Err(BulkInsertError::EmptyValues);
        }

        let values = format_values(&PgEscaper, self.shape, &self.row_values)?;
        Ok(format!(
            "{} {}{}",
            self.prefix_statement, values, self.suffix_statement
        ))
    }
}

/// Run one bulk insert in its own session and transaction
///
/// Constraint violations come back as [`DatabaseOutcome::Failure`] after a
/// rollback. Any other database error is rolled back too and returned as
/// [`BulkInsertError::Unclassified`]. There is exactly one attempt.
#[tracing::instrument(skip(db, spec), fields(rows = spec.row_values.len(), arity = spec.shape.arity()))]
pub async fn handle(db: &Database, spec: BulkInsertSpec) -> Result<BulkInsertReport, BulkInsertError> {
    let statement = spec.statement()?;

    let mut session = db.session().await?;
    let result = execute(&mut session, &statement).await;
    session.release().await;

    match result {
        Ok(rows_affected) => {
            tracing::info!(rows_affected, "Bulk insert committed");
            Ok(BulkInsertReport {
                statement,
                outcome: DatabaseOutcome::Success {
                    rows_affected: Some(rows_affected),
                },
            })
        }
        Err(e) => match ConstraintViolation::classify(&e) {
            Some(violation) => {
                tracing::warn!(kind = %violation.kind, "Bulk insert rejected by constraint");
                Ok(BulkInsertReport {
                    statement,
                    outcome: DatabaseOutcome::Failure(violation),
                })
            }
            None => {
                tracing::error!(error = %e, "Bulk insert failed");
                Err(DbError::from(e).into())
            }
        },
    }
}

async fn execute(session: &mut Session, statement: &str) -> Result<u64, sqlx::Error> {
    let mut tx = session.conn().begin().await?;

    match (&mut *tx).execute(statement).await {
        Ok(done) => {
            tx.commit().await?;
            Ok(done.rows_affected())
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}
