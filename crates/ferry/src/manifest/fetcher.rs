// Manifest Fetcher: retrieves a playlist, classifies it and rewrites its references.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};
use url::Url;

use super::rewriter::rewrite_playlist;
use crate::client::{Cookies, HttpClient};
use crate::error::Result;
use crate::guard::DomainGuard;

const PLAYLIST_SIGNATURE: &[u8] = b"#EXTM3U";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Body returned by [`ManifestFetcher::fetch_and_rewrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestBody {
    /// Rewritten playlist text
    Playlist(String),
    /// Anything that is not a playlist, passed through untouched
    Binary(Bytes),
}

#[derive(Debug, Clone)]
pub struct ManifestResponse {
    /// URL the manifest was fetched from; relative references are resolved against it
    pub url: Url,
    pub content_type: Option<String>,
    pub body: ManifestBody,
}

impl ManifestResponse {
    pub fn is_playlist(&self) -> bool {
        matches!(self.body, ManifestBody::Playlist(_))
    }

    pub fn playlist(&self) -> Option<&str> {
        match &self.body {
            ManifestBody::Playlist(text) => Some(text),
            ManifestBody::Binary(_) => None,
        }
    }

    /// Raw bytes of the body, rewritten text for playlists.
    pub fn content(&self) -> Bytes {
        match &self.body {
            ManifestBody::Playlist(text) => Bytes::copy_from_slice(text.as_bytes()),
            ManifestBody::Binary(bytes) => bytes.clone(),
        }
    }
}

/// Whether a declared content type names an HLS playlist.
fn is_playlist_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.contains("mpegurl")
}

/// Whether the body starts with the `#EXTM3U` signature, ignoring a BOM and leading whitespace.
fn has_playlist_signature(body: &[u8]) -> bool {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    body[start..].starts_with(PLAYLIST_SIGNATURE)
}

/// Decide playlist vs. binary from the declared type and the body signature.
pub fn classify(content_type: Option<&str>, body: &[u8]) -> bool {
    has_playlist_signature(body) || content_type.is_some_and(is_playlist_content_type)
}

#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    client: HttpClient,
    guard: Arc<DomainGuard>,
}

impl ManifestFetcher {
    pub fn new(client: HttpClient, guard: Arc<DomainGuard>) -> Self {
        Self { client, guard }
    }

    /// Fetch `url` and, when it is a playlist, rewrite its relative references.
    pub async fn fetch_and_rewrite(&self, url: &str, cookies: &Cookies) -> Result<ManifestResponse> {
        let url = self.guard.check(url)?;
        self.fetch_url(url, cookies).await
    }

    /// Same as [`fetch_and_rewrite`](Self::fetch_and_rewrite) for an already validated URL.
    pub(crate) async fn fetch_url(&self, url: Url, cookies: &Cookies) -> Result<ManifestResponse> {
        let response = self.client.get_success(&url, cookies, None).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await?;

        let body = if classify(content_type.as_deref(), &bytes) {
            match std::str::from_utf8(&bytes) {
                Ok(text) => ManifestBody::Playlist(rewrite_playlist(text, &url)),
                Err(e) => {
                    debug!(url = %url, error = %e, "Playlist-typed body is not UTF-8; passing through");
                    ManifestBody::Binary(bytes)
                }
            }
        } else {
            ManifestBody::Binary(bytes)
        };

        info!(
            url = %url,
            is_playlist = matches!(body, ManifestBody::Playlist(_)),
            "Fetched manifest"
        );

        Ok(ManifestResponse {
            url,
            content_type,
            body,
        })
    }
}
