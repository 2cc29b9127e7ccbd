//! Literal formatting for `VALUES` clauses
//!
//! Rows are rendered as `(v1,v2),(v3,v4)` so they can be appended directly
//! after an `INSERT ... VALUES` head. Every value goes through a
//! [`LiteralEscaper`]; nothing is interpolated raw.

use sea_query::{PostgresQueryBuilder, QueryBuilder, Value};
use thiserror::Error;

/// A single typed value destined for a SQL literal
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One row of values, in target column order
pub type Row = Vec<SqlValue>;

/// Number of values every row group must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValuesShape {
    arity: usize,
}

impl ValuesShape {
    pub const fn new(arity: usize) -> Self {
        Self { arity }
    }

    pub const fn arity(&self) -> usize {
        self.arity
    }

    fn check(&self, row_index: usize, row: &[SqlValue]) -> Result<(), FormatError> {
        if row.len() != self.arity {
            return Err(FormatError::ArityMismatch {
                row: row_index,
                expected: self.arity,
                actual: row.len(),
            });
        }
        Ok(())
    }
}

impl Default for ValuesShape {
    /// Two columns per row
    fn default() -> Self {
        Self::new(2)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscapeError {
    #[error("text values cannot contain NUL characters")]
    NulCharacter,

    #[error("text values cannot contain U+001A")]
    SubstituteCharacter,

    #[error("identifiers cannot be empty")]
    EmptyIdentifier,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("row {row} has {actual} values, expected {expected}")]
    ArityMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("row {row}, column {column}: {source}")]
    Escape {
        row: usize,
        column: usize,
        #[source]
        source: EscapeError,
    },
}

/// Driver-side quoting capability
pub trait LiteralEscaper {
    /// Render `value` as a literal that parses back to exactly `value`
    fn quote_literal(&self, value: &SqlValue) -> Result<String, EscapeError>;

    /// Render `ident` as a quoted identifier
    fn quote_identifier(&self, ident: &str) -> Result<String, EscapeError>;
}

/// PostgreSQL literals, rendered by `sea-query`'s Postgres backend
///
/// Text that needs backslash escapes comes out in escape-string form
/// (`E'...'`), so it reads back identically whatever
/// `standard_conforming_strings` is set to.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgEscaper;

impl PgEscaper {
    fn render(value: &Value) -> String {
        PostgresQueryBuilder.value_to_string(value)
    }

    fn quote_text(value: &str) -> Result<String, EscapeError> {
        if value.contains('\0') {
            return Err(EscapeError::NulCharacter);
        }
        // sea-query escapes U+001A as `\z`, which PostgreSQL reads back as `z`
        if value.contains('\u{1a}') {
            return Err(EscapeError::SubstituteCharacter);
        }
        Ok(Self::render(&Value::from(value)))
    }

    /// Negative zero and the non-finite values only read back from quoted input
    fn quote_float(value: f64) -> String {
        let special = if value.is_nan() {
            Some("NaN")
        } else if value == f64::INFINITY {
            Some("Infinity")
        } else if value == f64::NEG_INFINITY {
            Some("-Infinity")
        } else if value == 0.0 && value.is_sign_negative() {
            Some("-0")
        } else {
            None
        };

        match special {
            Some(text) => Self::render(&Value::from(text)),
            None => Self::render(&Value::from(value)),
        }
    }
}

impl LiteralEscaper for PgEscaper {
    fn quote_literal(&self, value: &SqlValue) -> Result<String, EscapeError> {
        Ok(match value {
            SqlValue::Null => Self::render(&Value::String(None)),
            SqlValue::Bool(v) => Self::render(&Value::from(*v)),
            SqlValue::Int(v) => Self::render(&Value::from(*v)),
            SqlValue::Float(v) => Self::quote_float(*v),
            SqlValue::Text(s) => Self::quote_text(s)?,
        })
    }

    fn quote_identifier(&self, ident: &str) -> Result<String, EscapeError> {
        if ident.is_empty() {
            return Err(EscapeError::EmptyIdentifier);
        }
        if ident.contains('\0') {
            return Err(EscapeError::NulCharacter);
        }
        Ok(format!("\"{}\"", ident.replace('"', "\"\"")))
    }
}

/// Join escaped row groups for a `VALUES` clause
///
/// An empty `rows` slice gives an empty string; an `INSERT` built from it is
/// malformed, so callers must reject empty input before executing.
pub fn format_values<E: LiteralEscaper + ?Sized>(
    escaper: &E,
    shape: ValuesShape,
    rows: &[Row],
) -> Result<String, FormatError> {
    let mut out = String::new();

    for (row_index, row) in rows.iter().enumerate() {
        shape.check(row_index, row)?;

        if row_index > 0 {
            out.push(',');
        }
        out.push('(');
        for (column, value) in row.iter().enumerate() {
            if column > 0 {
                out.push(',');
            }
            let literal = escaper
                .quote_literal(value)
                .map_err(|source| FormatError::Escape {
                    row: row_index,
                    column,
                    source,
                })?;
            out.push_str(&literal);
        }
        out.push(')');
    }

    Ok(out)
}
