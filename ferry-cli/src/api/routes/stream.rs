//! Stream relay route.
//!
//! Media elements cannot attach session cookies to cross-origin requests, so segment and
//! file requests go through `/api/stream`, which forwards cookies and the `Range` header.

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use ferry_engine::StreamRequest;
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::routes::media_cors_headers;
use crate::api::routes::playlist::query_cookies;
use crate::api::server::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub url: Option<String>,
    /// JSON object or `Cookie` header string
    pub cookies: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(stream_get).options(stream_options))
}

async fn stream_options() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    media_cors_headers(&mut headers);
    (StatusCode::NO_CONTENT, headers)
}

async fn stream_get(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers_in: HeaderMap,
) -> ApiResult<Response> {
    let mut request = StreamRequest::new(query.url.unwrap_or_default())
        .with_cookies(query_cookies(query.cookies.as_deref())?);
    if let Some(range) = headers_in.get(header::RANGE)
        && let Ok(range) = range.to_str()
    {
        request = request.with_range(range);
    }

    let relayed = state.gateway.proxy_video_stream(&request).await?;

    let mut out_headers = relayed.headers;
    media_cors_headers(&mut out_headers);

    let mut response = (relayed.status, Body::from_stream(relayed.body)).into_response();
    *response.headers_mut() = out_headers;
    Ok(response)
}
