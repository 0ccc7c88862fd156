use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::file::{CopyFileRequest, MoveFileRequest, UpdateFileRequest};
use crate::services::file_service::{self, UploadRequest};
use crate::services::run_to_completion;
use crate::state::AppState;

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

pub async fn list_files(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let files = file_service::list_files(&state).await?;
    Ok(Json(json!({
        "data": {
            "total": files.len(),
            "files": files,
        },
        "error": null
    })))
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field
            .file_name()
            .map(String::from)
            .ok_or_else(|| AppError::BadRequest("File part has no file name".into()))?;
        let mime_type = field
            .content_type()
            .map(String::from)
            .unwrap_or_else(|| {
                mime_guess::from_path(&original_name)
                    .first_or_octet_stream()
                    .to_string()
            });
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some(UploadRequest {
            original_name,
            mime_type,
            data,
        });
        break;
    }

    let upload = upload.ok_or_else(|| {
        AppError::BadRequest(format!("Missing multipart field '{}'", FILE_FIELD))
    })?;

    let record =
        run_to_completion(async move { file_service::upload_file(&state, upload).await }).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": record, "error": null })),
    ))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let record = file_service::get_file(&state, id).await?;
    Ok(Json(json!({ "data": record, "error": null })))
}

pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFileRequest>,
) -> Result<Json<Value>, AppError> {
    let record =
        run_to_completion(async move { file_service::update_file(&state, id, req).await }).await?;
    Ok(Json(json!({ "data": record, "error": null })))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let record =
        run_to_completion(async move { file_service::delete_file(&state, id).await }).await?;
    Ok(Json(json!({ "data": record, "error": null })))
}

pub async fn move_file(
    State(state): State<AppState>,
    Json(req): Json<MoveFileRequest>,
) -> Result<Json<Value>, AppError> {
    let record = run_to_completion(async move {
        file_service::move_file(&state, &req.from_path, &req.to_path).await
    })
    .await?;
    Ok(Json(json!({ "data": record, "error": null })))
}

pub async fn copy_file(
    State(state): State<AppState>,
    Json(req): Json<CopyFileRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let record = run_to_completion(async move {
        file_service::copy_file(&state, &req.from_path, &req.to_path).await
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": record, "error": null })),
    ))
}

pub async fn access_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let (record, token) = file_service::issue_access_token(&state, id).await?;
    Ok(Json(json!({
        "data": {
            "token": token,
            "url": format!("{}?token={}", record.url, token),
        },
        "error": null
    })))
}
