//! Shared upstream HTTP client.
//!
//! One [`HttpClient`] is built from [`ClientConfig`] and cloned into the manifest fetcher,
//! the stream relay and the download scheduler so they share a connection pool.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::{Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::proxy::build_proxy_from_config;

/// Session cookies forwarded to upstream hosts, keyed by cookie name.
pub type Cookies = BTreeMap<String, String>;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Render a cookie map as a `Cookie` header value (`a=1; b=2`).
pub fn cookie_header(cookies: &Cookies) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        install_rustls_provider();

        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::configuration(format!("invalid header name `{name}`")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::configuration(format!("invalid value for header `{name}`")))?;
            default_headers.insert(name, value);
        }

        // No overall request timeout: long segment and file bodies must be able to stream
        // for as long as data keeps arriving.
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(default_headers)
            .connect_timeout(config.connect_timeout())
            .tcp_nodelay(true)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout())
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs);

        if let Some(read_timeout) = config.read_timeout() {
            builder = builder.read_timeout(read_timeout);
        }

        if let Some(proxy_config) = &config.proxy {
            let proxy = build_proxy_from_config(proxy_config).map_err(Error::configuration)?;
            builder = builder.proxy(proxy);
        }

        let inner = builder.build()?;
        Ok(Self { inner })
    }

    pub fn from_reqwest(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    /// Issue a GET with the session cookies and an optional `Range` header.
    ///
    /// Only transport failures are errors here; status handling is left to the caller.
    pub async fn get(&self, url: &Url, cookies: &Cookies, range: Option<&str>) -> Result<Response> {
        let mut request = self.inner.get(url.clone());
        if let Some(cookie) = cookie_header(cookies) {
            request = request.header(COOKIE, cookie);
        }
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        debug!(url = %url, range = ?range, "Sending upstream request");
        Ok(request.send().await?)
    }

    /// Like [`get`](Self::get) but turns non-2xx responses into `UpstreamHttp` errors.
    pub async fn get_success(
        &self,
        url: &Url,
        cookies: &Cookies,
        range: Option<&str>,
    ) -> Result<Response> {
        let response = self.get(url, cookies, range).await?;
        ensure_success(response, url)
    }
}

pub(crate) fn ensure_success(response: Response, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::FORBIDDEN {
        warn!(url = %url, "Upstream returned 403; session cookies are probably stale");
    } else {
        warn!(url = %url, status = %status, "Upstream returned an error status");
    }
    Err(Error::http_status(status, url.as_str()))
}
