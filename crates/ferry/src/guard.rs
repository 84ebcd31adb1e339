//! Allow-list check for upstream media hosts.
//!
//! Every component that talks to the network validates the target through
//! [`DomainGuard::check`] first, so a rejected URL never reaches the HTTP client.

use url::Url;

use crate::error::{Error, Result};

/// Allow-list of upstream host suffixes.
///
/// A host is allowed when it equals one of the suffixes or is a subdomain of it
/// (`media.cdn.example.com` matches `cdn.example.com`). Comparison ignores case.
#[derive(Debug, Clone, Default)]
pub struct DomainGuard {
    suffixes: Vec<String>,
}

impl DomainGuard {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffixes = suffixes
            .into_iter()
            .map(|s| s.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { suffixes }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Pure predicate: true when `url` is an http(s) URL whose host is on the allow-list.
    pub fn is_allowed_host(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .is_some_and(|parsed| self.is_allowed(&parsed))
    }

    pub fn is_allowed(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.suffixes.iter().any(|suffix| {
            host == *suffix
                || host
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Validate a caller-supplied URL and return it parsed.
    ///
    /// Fails with `MissingUrl`, `InvalidUrl` or `InvalidDomain`; never performs I/O.
    pub fn check(&self, url: &str) -> Result<Url> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::MissingUrl);
        }
        let parsed = Url::parse(url).map_err(|e| Error::invalid_url(url, e.to_string()))?;
        if !self.is_allowed(&parsed) {
            return Err(Error::invalid_domain(parsed.host_str().unwrap_or_default()));
        }
        Ok(parsed)
    }
}
