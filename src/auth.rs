use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;

use crate::access::constant_time_eq;

/// Rejects requests that do not carry the configured API key, either as
/// `X-API-Key` or as an `Authorization: Bearer` credential.
#[derive(Clone)]
pub struct ApiKeyLayer {
    api_key: Arc<String>,
}

impl ApiKeyLayer {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key: Arc::new(api_key),
        }
    }
}

impl<S> tower::Layer<S> for ApiKeyLayer {
    type Service = ApiKeyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyService {
            inner,
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ApiKeyService<S> {
    inner: S,
    api_key: Arc<String>,
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

fn unauthorized() -> Response {
    let body = json!({
        "data": null,
        "error": {
            "code": 401,
            "kind": "unauthorized",
            "message": "Invalid or missing API key"
        }
    });
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}

impl<S, B> tower::Service<axum::http::Request<B>> for ApiKeyService<S>
where
    S: tower::Service<axum::http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: axum::http::Request<B>) -> Self::Future {
        let authorized = !self.api_key.is_empty()
            && presented_key(req.headers())
                .is_some_and(|key| constant_time_eq(key.as_bytes(), self.api_key.as_bytes()));

        if !authorized {
            tracing::debug!(uri = %req.uri(), "Rejected request without valid API key");
            return Box::pin(async { Ok(unauthorized()) });
        }

        // Drive the clone that was polled ready, leave a fresh one behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}
