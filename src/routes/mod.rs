pub mod files;
pub mod health;
pub mod views;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::ApiKeyLayer;
use crate::state::AppState;

/// Room for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_key = state.config.api_key.clone();
    let body_limit = state.config.max_upload_size as usize + MULTIPART_OVERHEAD;

    // Public routes: lookup keys are the capability for views
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/views/{key}", get(views::view_file));

    let api_routes = Router::new()
        .route("/status", get(health::status))
        .route("/audit", get(health::audit))
        .route("/files", get(files::list_files).post(files::upload_file))
        .route("/files/move", post(files::move_file))
        .route("/files/copy", post(files::copy_file))
        .route(
            "/files/{id}",
            get(files::get_file)
                .put(files::update_file)
                .delete(files::delete_file),
        )
        .route("/files/{id}/access-token", get(files::access_token))
        .layer(ApiKeyLayer::new(api_key));

    let x_request_id = http::HeaderName::from_static("x-request-id");

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed: &str) -> CorsLayer {
    let origins: Vec<http::HeaderValue> = allowed
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "*")
        .filter_map(|o| o.parse().ok())
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
