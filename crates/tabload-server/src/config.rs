//! Configuration management
//!
//! Built once at startup from the environment (after loading `.env`) and
//! handed to the router; nothing below `main` reads the environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tabload_common::TabloadError;

use crate::db::{DbConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DATABASE_PORT};
use crate::features::ingest::IngestionMode;
use crate::features::uploads::CollisionPolicy;
use crate::sql::TableSchema;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default directory for stored uploads.
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

/// Default accepted file extensions.
pub const DEFAULT_ALLOWED_EXTENSIONS: &str = "csv,txt";

/// Default request body limit (16 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Default target table for imports.
pub const DEFAULT_INGEST_TABLE: &str = "public.iris";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub uploads: UploadConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub root: PathBuf,
    /// Lower-cased, without the leading dot
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
    pub collision: CollisionPolicy,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    pub mode: IngestionMode,
    pub table: &'static TableSchema,
    /// Apply the bundled migrations at startup
    pub run_migrations: bool,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let table_name = env.string_or("INGEST_TABLE", DEFAULT_INGEST_TABLE);
        let table = TableSchema::lookup(&table_name).ok_or_else(|| {
            TabloadError::invalid_config("INGEST_TABLE", format!("unknown table '{}'", table_name))
        })?;

        let config = Config {
            server: ServerConfig {
                host: env.string_or("TABLOAD_HOST", DEFAULT_SERVER_HOST),
                port: env.parsed_or("TABLOAD_PORT", DEFAULT_SERVER_PORT)?,
                shutdown_timeout_secs: env
                    .parsed_or("TABLOAD_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS)?,
            },
            database: DbConfig {
                host: env.required("PG_HOST")?,
                port: env.parsed_or("PG_PORT", DEFAULT_DATABASE_PORT)?,
                database: env.required("PG_DATABASE")?,
                user: env.required("PG_USER")?,
                password: env.required("PG_PASSWORD")?,
                pool_size: env.parsed_or("PG_POOL_SIZE", 0)?,
                connect_timeout_secs: env
                    .parsed_or("PG_CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            },
            uploads: UploadConfig {
                root: PathBuf::from(env.string_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
                allowed_extensions: parse_extensions(
                    &env.string_or("UPLOAD_ALLOWED_EXTENSIONS", DEFAULT_ALLOWED_EXTENSIONS),
                ),
                max_bytes: env.parsed_or("UPLOAD_MAX_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
                collision: env.parsed_or("UPLOAD_COLLISION_POLICY", CollisionPolicy::default())?,
            },
            ingest: IngestConfig {
                mode: env.parsed_or("INGEST_MODE", IngestionMode::default())?,
                table,
                run_migrations: env.parsed_or("RUN_MIGRATIONS", false)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.port == 0 {
            anyhow::bail!("Database port must be greater than 0");
        }

        if self.uploads.allowed_extensions.is_empty() {
            anyhow::bail!("At least one upload extension must be allowed");
        }

        if self.uploads.max_bytes == 0 {
            anyhow::bail!("Upload size limit must be greater than 0");
        }

        if self.database.pool_size == 0 {
            tracing::debug!("No pool configured - each request opens its own connection");
        }

        Ok(())
    }
}

/// `".CSV, txt,,"` -> `["csv", "txt"]`
fn parse_extensions(raw: &str) -> Vec<String> {
    let mut extensions: Vec<String> = raw
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    extensions.dedup();
    extensions
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank are treated alike
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, TabloadError> {
        self.get(key)
            .ok_or_else(|| TabloadError::MissingConfig(key.to_string()))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, TabloadError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| TabloadError::invalid_config(key, e.to_string())),
            None => Ok(default),
        }
    }
}
