//! Stream relay.
//!
//! Proxies one upstream GET (optionally a byte range) and hands the body back as a stream,
//! never buffering the full payload.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap};
use tracing::debug;
use url::Url;

use crate::client::{Cookies, HttpClient, ensure_success};
use crate::error::Result;
use crate::guard::DomainGuard;

/// Upstream response headers copied onto a relayed response.
pub const RELAYED_HEADERS: [reqwest::header::HeaderName; 4] =
    [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_RANGE, ACCEPT_RANGES];

/// One relay call: target URL, session cookies and an optional `Range` value.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub url: String,
    pub cookies: Cookies,
    /// Forwarded verbatim, e.g. `bytes=0-1023`
    pub range: Option<String>,
}

impl StreamRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_cookies(mut self, cookies: Cookies) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

pub struct RelayResponse {
    /// Upstream status, 200 or 206 in practice
    pub status: StatusCode,
    /// Only the headers in [`RELAYED_HEADERS`]
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl RelayResponse {
    /// Declared body length, when upstream sent `Content-Length`.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }
}

impl fmt::Debug for RelayResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct StreamRelay {
    client: HttpClient,
    guard: Arc<DomainGuard>,
}

impl StreamRelay {
    pub fn new(client: HttpClient, guard: Arc<DomainGuard>) -> Self {
        Self { client, guard }
    }

    pub async fn relay(&self, request: &StreamRequest) -> Result<RelayResponse> {
        let url = self.guard.check(&request.url)?;
        self.relay_url(&url, &request.cookies, request.range.as_deref())
            .await
    }

    pub(crate) async fn relay_url(
        &self,
        url: &Url,
        cookies: &Cookies,
        range: Option<&str>,
    ) -> Result<RelayResponse> {
        let upstream = self.client.get(url, cookies, range).await?;
        let upstream = ensure_success(upstream, url)?;
        let status = upstream.status();

        let mut headers = HeaderMap::new();
        for name in RELAYED_HEADERS {
            if let Some(value) = upstream.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }

        debug!(url = %url, status = %status, range = ?range, "Relaying upstream body");

        let body = upstream.bytes_stream().map_err(std::io::Error::other);
        Ok(RelayResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
