//! Playlist proxy route.
//!
//! Fetches an HLS playlist on behalf of the player and returns it with relative references
//! made absolute. Bodies that turn out not to be playlists are passed through untouched.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use ferry_engine::{Cookies, ManifestBody};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::routes::media_cors_headers;
use crate::api::server::AppState;
use crate::cookies::parse_cookie_param;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Deserialize)]
pub struct PlaylistQuery {
    pub url: Option<String>,
    /// JSON object or `Cookie` header string
    pub cookies: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_playlist))
}

/// Parse the optional `cookies` query parameter shared by the media routes.
pub(crate) fn query_cookies(raw: Option<&str>) -> ApiResult<Cookies> {
    match raw {
        Some(raw) => Ok(parse_cookie_param(raw)?),
        None => Ok(Cookies::new()),
    }
}

async fn get_playlist(
    State(state): State<AppState>,
    Query(query): Query<PlaylistQuery>,
) -> ApiResult<Response> {
    let cookies = query_cookies(query.cookies.as_deref())?;
    let manifest = state
        .gateway
        .proxy_hls_playlist(query.url.as_deref().unwrap_or_default(), &cookies)
        .await?;

    let mut headers = HeaderMap::new();
    media_cors_headers(&mut headers);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let response = match manifest.body {
        ManifestBody::Playlist(text) => {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
            );
            (StatusCode::OK, headers, text).into_response()
        }
        ManifestBody::Binary(bytes) => {
            let content_type = manifest
                .content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
                .unwrap_or(HeaderValue::from_static("application/octet-stream"));
            headers.insert(header::CONTENT_TYPE, content_type);
            (StatusCode::OK, headers, bytes).into_response()
        }
    };
    Ok(response)
}
