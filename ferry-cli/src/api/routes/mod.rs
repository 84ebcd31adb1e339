//! API route modules.

pub mod downloads;
pub mod playlist;
pub mod stream;

use axum::Router;
use axum::http::{HeaderMap, HeaderValue, header};

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/playlist", playlist::router())
        .nest("/api/stream", stream::router())
        .nest("/api/downloads", downloads::router())
        .with_state(state)
}

/// Permissive CORS headers for media elements on another origin.
pub(crate) fn media_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Range"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length, Content-Range, Accept-Ranges"),
    );
}
