//! Run a single statement on its own session

use sqlx::postgres::PgRow;
use sqlx::{Connection, Executor};

use super::{Database, DbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Commit afterwards; otherwise the statement's effects are rolled back
    pub commit: bool,
    /// Fetch and return every result row
    pub get_result: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            commit: false,
            get_result: true,
        }
    }
}

impl QueryOptions {
    /// Commit and discard any result rows
    pub const fn command() -> Self {
        Self {
            commit: true,
            get_result: false,
        }
    }
}

/// Execute `statement` on a fresh session
///
/// A bare `&str` carries no arguments, so it goes over the simple query
/// protocol and may hold several statements.
///
/// Errors are returned as the driver reported them. The session is
/// released on every path; an error mid-transaction rolls back when the
/// transaction and session drop.
#[tracing::instrument(skip(db, statement), fields(commit = options.commit, get_result = options.get_result))]
pub async fn simple_query(
    db: &Database,
    statement: &str,
    options: QueryOptions,
) -> DbResult<Option<Vec<PgRow>>> {
    tracing::debug!(statement = %statement, "Executing statement");

    let mut session = db.session().await?;
    let mut tx = session.conn().begin().await?;

    let rows = if options.get_result {
        Some((&mut *tx).fetch_all(statement).await?)
    } else {
        let done = (&mut *tx).execute(statement).await?;
        tracing::debug!(rows_affected = done.rows_affected(), "Statement executed");
        None
    };

    if options.commit {
        tx.commit().await?;
    } else {
        tx.rollback().await?;
    }

    session.close().await?;
    Ok(rows)
}
