use anyhow::Context;
use file_vault::access;
use file_vault::background;
use file_vault::config::AppConfig;
use file_vault::routes;
use file_vault::services::file_service;
use file_vault::state::AppState;
use file_vault::storage::LocalStorage;
use file_vault::store::WalMetadataStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting file-vault v{}", env!("CARGO_PKG_VERSION"));

    let storage = LocalStorage::open(config.storage_root())
        .await
        .with_context(|| format!("Failed to open storage root {}", config.storage_root))?;
    tracing::info!(root = %storage.root().display(), "Storage root ready");

    // Snapshot + WAL replay happen inside open
    let store = WalMetadataStore::open(&config.metadata_dir())
        .with_context(|| format!("Failed to open metadata store {}", config.metadata_dir))?;

    let policy = access::from_config(&config);
    let state = AppState::new(
        config.clone(),
        Arc::new(store),
        Arc::new(storage),
        Arc::from(policy),
    );

    report_divergence(&state).await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let snapshot_handle = tokio::spawn(background::snapshot_writer::run(
        state.clone(),
        shutdown_rx.clone(),
    ));

    let app = routes::build_router(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("Server error")?;

    // The writer takes its final snapshot before it returns
    tracing::info!("Waiting for background tasks to finish");
    let _ = snapshot_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}

/// Log every record without an object and every object without a record.
/// Nothing is repaired automatically.
async fn report_divergence(state: &AppState) {
    match file_service::audit(state).await {
        Ok(report) if report.is_clean() => {
            tracing::info!("Storage and metadata are consistent");
        }
        Ok(report) => {
            for record in &report.missing_objects {
                tracing::warn!(
                    id = %record.id,
                    path = %record.path,
                    "Record points at a missing storage object"
                );
            }
            for path in &report.orphaned_objects {
                tracing::warn!(path = %path, "Storage object has no owning record");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup audit failed");
        }
    }
}
