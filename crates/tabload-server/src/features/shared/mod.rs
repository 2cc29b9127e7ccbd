//! Helpers shared across feature slices
//!
//! - **error_helpers**: classification of constraint violations into 422 responses
//! - **validation**: filename sanitization for stored uploads and checks for served names

pub mod error_helpers;
pub mod validation;

pub use error_helpers::{ConstraintViolation, ViolationKind};
pub use validation::{file_extension, secure_filename, validate_served_name, ServedNameError};
