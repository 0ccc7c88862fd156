use crate::state::AppState;
use std::time::Duration;
use tokio::sync::watch;

/// Periodically fold the metadata WAL into a snapshot; once more on shutdown.
pub async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval = Duration::from_secs(state.config.snapshot_interval_secs.max(1));

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                tracing::info!("Snapshot writer shutting down, writing final snapshot");
                write_snapshot(&state).await;
                return;
            }
        }

        write_snapshot(&state).await;
    }
}

pub async fn write_snapshot(state: &AppState) {
    if let Err(e) = state.store.compact().await {
        tracing::error!(error = %e, "Failed to write metadata snapshot");
    }
}
