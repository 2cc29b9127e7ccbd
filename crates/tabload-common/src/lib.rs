//! tabload common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared pieces used by every tabload binary:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Error Handling**: the shared error and result types
//!
//! # Example
//!
//! ```no_run
//! use tabload_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{Result, TabloadError};
