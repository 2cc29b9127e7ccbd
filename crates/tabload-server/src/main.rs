//! tabload server - main entry point

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tabload_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tracing::info;

use tabload_server::{
    api,
    config::Config,
    db::Database,
    features::{self, uploads::UploadGate},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::default()
        .with_prefix("tabload-server")
        .with_filter("tabload_server=debug,tower_http=debug,sqlx=warn")
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting tabload server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let gate = UploadGate::open(&config.uploads)
        .await
        .context("Upload directory must exist and be writable")?;

    let db = Database::new(&config.database);

    if config.ingest.run_migrations {
        let mut session = db.session().await.context("Failed to connect for migrations")?;
        sqlx::migrate!("../../migrations")
            .run(session.conn())
            .await
            .context("Failed to run migrations")?;
        session.close().await?;
        info!("Database migrations completed");
    }

    info!(
        mode = %config.ingest.mode,
        table = %config.ingest.table.display_name(),
        "Ingestion configured"
    );

    let state = features::FeatureState {
        db,
        gate: Arc::new(gate),
        ingest: config.ingest,
    };

    let app = api::create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
