//! Filename validation shared by the upload and download paths
//!
//! ```rust,ignore
//! use tabload_server::features::shared::validation::{secure_filename, validate_served_name};
//!
//! assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
//! validate_served_name("data.csv")?;
//! ```

use std::path::{Component, Path};

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Reserved device names on Windows
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Errors for a client-supplied name of a stored file
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServedNameError {
    #[error("Filename is required and cannot be empty")]
    Required,

    #[error("Filename cannot contain path separators")]
    Separator,

    #[error("Filename cannot contain control characters")]
    ControlCharacter,

    #[error("Filename cannot contain '..'")]
    ParentReference,

    #[error("Filename cannot start with '.'")]
    Hidden,

    #[error("Filename must be a single relative path segment")]
    NotASegment,
}

/// Reduce an untrusted filename to a safe single path segment
///
/// # Rules
/// - Unicode is NFKD-decomposed and anything left outside ASCII dropped
/// - `/` and `\` become spaces, whitespace runs become a single `_`
/// - Characters outside `[A-Za-z0-9_.-]` are removed
/// - Runs of `.` collapse to one, so `..` never survives
/// - Leading and trailing `.` and `_` are stripped
/// - Windows device names get a `_` prefix
///
/// The result may be empty; callers must reject that.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    let mut kept = String::with_capacity(joined.len());
    for c in joined.chars() {
        if !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
            continue;
        }
        if c == '.' && kept.ends_with('.') {
            continue;
        }
        kept.push(c);
    }

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem))
    {
        return format!("_{}", trimmed);
    }
    trimmed.to_string()
}

/// Lower-cased text after the last `.`, if there is one
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Check that `name` can only ever address a direct child of a directory
pub fn validate_served_name(name: &str) -> Result<(), ServedNameError> {
    if name.is_empty() {
        return Err(ServedNameError::Required);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ServedNameError::Separator);
    }
    if name.chars().any(char::is_control) {
        return Err(ServedNameError::ControlCharacter);
    }
    if name.contains("..") {
        return Err(ServedNameError::ParentReference);
    }
    if name.starts_with('.') {
        return Err(ServedNameError::Hidden);
    }

    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !path.is_absolute() => Ok(()),
        _ => Err(ServedNameError::NotASegment),
    }
}
