//! Database constraint classification
//!
//! Foreign-key and not-null violations are the two failures the ingest paths
//! turn into structured responses. Everything else stays a plain database
//! error.
//!
//! ```rust,ignore
//! match ConstraintViolation::classify(&err) {
//!     Some(violation) => return Ok(violation.into_response()),
//!     None => return Err(err.into()),
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sqlx::postgres::PgDatabaseError;
use sqlx::Error as SqlxError;

/// SQLSTATE for `foreign_key_violation`
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// SQLSTATE for `not_null_violation`
pub const NOT_NULL_VIOLATION: &str = "23502";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    ForeignKeyViolation,
    NotNullViolation,
}

impl ViolationKind {
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            FOREIGN_KEY_VIOLATION => Some(ViolationKind::ForeignKeyViolation),
            NOT_NULL_VIOLATION => Some(ViolationKind::NotNullViolation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::ForeignKeyViolation => "ForeignKeyViolation",
            ViolationKind::NotNullViolation => "NotNullViolation",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified constraint failure with the driver's message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ConstraintViolation {
    pub kind: ViolationKind,
    pub message: String,
}

impl ConstraintViolation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `Some` for foreign-key and not-null violations, `None` otherwise
    pub fn classify(error: &SqlxError) -> Option<Self> {
        let SqlxError::Database(db_err) = error else {
            return None;
        };
        let kind = ViolationKind::from_sqlstate(db_err.code()?.as_ref())?;

        let mut message = db_err.message().to_string();
        if let Some(detail) = db_err
            .try_downcast_ref::<PgDatabaseError>()
            .and_then(PgDatabaseError::detail)
        {
            message.push_str("\nDETAIL:  ");
            message.push_str(detail);
        }

        Some(Self::new(kind, message))
    }

    /// `{"<kind>": "<message>"}`
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            self.kind.as_str().to_string(),
            serde_json::Value::String(self.message.clone()),
        );
        serde_json::Value::Object(body)
    }
}

impl IntoResponse for ConstraintViolation {
    fn into_response(self) -> Response {
        tracing::warn!(kind = %self.kind, message = %self.message, "Constraint violation");
        (StatusCode::UNPROCESSABLE_ENTITY, Json(self.to_json())).into_response()
    }
}
