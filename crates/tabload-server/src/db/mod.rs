//! Database sessions
//!
//! Every database operation runs on a [`Session`] obtained from
//! [`Database::session`]. By default each session is a brand new
//! connection that is closed when the session ends; with a pool size above
//! zero sessions are checked out of a bounded `sqlx` pool instead. In both
//! cases dropping a session releases its connection, so early returns and
//! `?` never leak one.

pub mod query;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Executor, Postgres};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use query::{simple_query, QueryOptions};

/// Default PostgreSQL port
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Timed out after {0:?} while connecting to the database")]
    ConnectTimeout(Duration),
}

impl DbError {
    /// The driver error, when there is one
    pub fn as_sqlx(&self) -> Option<&sqlx::Error> {
        match self {
            DbError::Sqlx(e) => Some(e),
            DbError::ConnectTimeout(_) => None,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Zero opens a fresh connection per session
    pub pool_size: u32,
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl DbConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

/// Source of sessions; cheap to clone
#[derive(Clone)]
pub struct Database {
    options: PgConnectOptions,
    pool: Option<PgPool>,
    connect_timeout: Duration,
}

impl Database {
    /// Build from configuration without touching the network
    pub fn new(config: &DbConfig) -> Self {
        let options = config.connect_options();
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let pool = (config.pool_size > 0).then(|| {
            PgPoolOptions::new()
                .max_connections(config.pool_size)
                .min_connections(0)
                .acquire_timeout(connect_timeout)
                .connect_lazy_with(options.clone())
        });

        tracing::info!(
            host = %config.host,
            database = %config.database,
            pooled = pool.is_some(),
            pool_size = config.pool_size,
            "Database configured"
        );

        Self {
            options,
            pool,
            connect_timeout,
        }
    }

    /// Wrap an existing pool, as handed out by `#[sqlx::test]`
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            options: (*pool.connect_options()).clone(),
            pool: Some(pool),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Open (or check out) a session owned by the caller
    pub async fn session(&self) -> DbResult<Session> {
        if let Some(pool) = &self.pool {
            let conn = pool.acquire().await?;
            return Ok(Session {
                conn: SessionConn::Pooled(conn),
            });
        }

        let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| DbError::ConnectTimeout(self.connect_timeout))??;

        tracing::debug!("Opened database connection");
        Ok(Session {
            conn: SessionConn::Direct(conn),
        })
    }

    pub async fn health_check(&self) -> DbResult<()> {
        let mut session = self.session().await?;
        session.conn().execute("SELECT 1").await?;
        session.close().await
    }
}

enum SessionConn {
    Direct(PgConnection),
    Pooled(PoolConnection<Postgres>),
}

/// A single connection owned by one operation
///
/// Dropping it closes a direct connection or returns a pooled one; prefer
/// [`Session::close`] on the happy path so the server sees a clean
/// termination.
pub struct Session {
    conn: SessionConn,
}

impl Session {
    pub fn conn(&mut self) -> &mut PgConnection {
        match &mut self.conn {
            SessionConn::Direct(conn) => conn,
            SessionConn::Pooled(conn) => &mut **conn,
        }
    }

    pub async fn close(self) -> DbResult<()> {
        match self.conn {
            SessionConn::Direct(conn) => {
                conn.close().await?;
                tracing::debug!("Closed database connection");
            }
            SessionConn::Pooled(conn) => drop(conn),
        }
        Ok(())
    }

    /// Close, logging instead of failing; used on paths that already carry an error
    pub async fn release(self) {
        if let Err(e) = self.close().await {
            tracing::warn!(error = %e, "Failed to close database session cleanly");
        }
    }
}
