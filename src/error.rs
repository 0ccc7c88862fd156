use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage and metadata diverged and the compensating action failed too.
    #[error("Inconsistent state: {0}")]
    Inconsistency(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::Inconsistency(_) => "inconsistency",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Internal(_) | AppError::Io(_) | AppError::Anyhow(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Inconsistency(_)
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a storage-medium failure on `path` to the engine's error kinds.
    pub fn from_storage(op: &str, path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFound(format!("{op}: no object at {path}")),
            ErrorKind::AlreadyExists => {
                AppError::Forbidden(format!("{op}: destination already occupied: {path}"))
            }
            ErrorKind::PermissionDenied => {
                AppError::Forbidden(format!("{op}: path not permitted: {path}"))
            }
            // A path segment names an object, or the target is a directory.
            ErrorKind::NotADirectory | ErrorKind::IsADirectory => {
                AppError::Forbidden(format!("{op}: not a valid object path: {path}"))
            }
            _ => AppError::Io(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::Inconsistency(msg)
            | AppError::BadRequest(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Io(e) => e.to_string(),
            AppError::Anyhow(e) => e.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, kind = self.kind(), error = %message);
        } else {
            tracing::warn!(status = %status, kind = self.kind(), error = %message);
        }

        let body = json!({
            "data": null,
            "error": {
                "code": status.as_u16(),
                "kind": self.kind(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn storage_errors_map_to_engine_kinds() {
        let kind_of = |k: ErrorKind| AppError::from_storage("move", "a/b.txt", Error::from(k)).kind();

        assert_eq!(kind_of(ErrorKind::NotFound), "not_found");
        assert_eq!(kind_of(ErrorKind::AlreadyExists), "forbidden");
        assert_eq!(kind_of(ErrorKind::PermissionDenied), "forbidden");
        assert_eq!(kind_of(ErrorKind::NotADirectory), "forbidden");
        assert_eq!(kind_of(ErrorKind::IsADirectory), "forbidden");
        assert_eq!(kind_of(ErrorKind::Other), "internal");
    }
}
