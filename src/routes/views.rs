use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::access::AccessContext;
use crate::error::AppError;
use crate::services::file_service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    pub token: Option<String>,
}

pub async fn view_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ctx = access_context(&headers, query.token);
    let (record, reader) = file_service::view_file(&state, &key, &ctx).await?;

    tracing::debug!(id = %record.id, views = record.views, "File viewed");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &record.mime_type)
        .header(header::CONTENT_LENGTH, record.size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&record.original_name),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build view response: {}", e)))
}

fn access_context(headers: &HeaderMap, query_token: Option<String>) -> AccessContext {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    AccessContext {
        referer: header_str(header::REFERER.as_str()),
        origin: header_str(header::ORIGIN.as_str()),
        token: query_token.or_else(|| header_str("x-access-token")),
    }
}

/// `inline` disposition with a header-safe rendering of the display name.
fn content_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("inline; filename=\"{}\"", safe)
}
