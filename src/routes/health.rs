use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::services::file_service;
use crate::state::AppState;

pub async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let files = file_service::list_files(&state).await?;
    let total_size: u64 = files.iter().map(|f| f.size).sum();
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds();

    Ok(Json(json!({
        "data": {
            "file_count": files.len(),
            "total_size_bytes": total_size,
            "uptime_seconds": uptime,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "error": null
    })))
}

pub async fn audit(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let report = file_service::audit(&state).await?;
    Ok(Json(json!({
        "data": {
            "clean": report.is_clean(),
            "missing_objects": report.missing_objects,
            "orphaned_objects": report.orphaned_objects,
        },
        "error": null
    })))
}
