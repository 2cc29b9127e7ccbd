//! Error types shared across tabload crates

use thiserror::Error;

/// Result type alias for tabload operations
pub type Result<T> = std::result::Result<T, TabloadError>;

#[derive(Error, Debug)]
pub enum TabloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required environment variable is absent
    #[error("Missing required configuration value: {0}")]
    MissingConfig(String),

    /// A configuration value is present but cannot be used
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },
}

impl TabloadError {
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
