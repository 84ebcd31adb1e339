use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing URL")]
    MissingUrl,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("host `{host}` is not an allowed media host")]
    InvalidDomain { host: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("upstream responded with HTTP {status} for {url}")]
    UpstreamHttp { status: StatusCode, url: String },

    #[error("unparseable playlist line `{line}`: {reason}")]
    Parse { line: String, reason: String },

    #[error("a download for episode `{episode_id}` is already pending or in progress")]
    DuplicateDownload { episode_id: String },

    #[error("no download found for episode `{episode_id}`")]
    NotFound { episode_id: String },

    #[error("{op} `{}`: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {source}")]
    Stream {
        #[from]
        source: std::io::Error,
    },

    #[error("unsupported source: {reason}")]
    Unsupported { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("download cancelled")]
    Cancelled,
}

/// Discriminant of [`Error`] for callers that render a tagged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingUrl,
    InvalidUrl,
    InvalidDomain,
    NetworkError,
    UpstreamHttpError,
    ParseError,
    DuplicateDownload,
    NotFound,
    Io,
    Unsupported,
    Configuration,
    Cancelled,
}

impl Error {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_domain(host: impl Into<String>) -> Self {
        Self::InvalidDomain { host: host.into() }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            status,
            url: url.into(),
        }
    }

    pub fn parse(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.into(),
            reason: reason.into(),
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingUrl => ErrorKind::MissingUrl,
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::InvalidDomain { .. } => ErrorKind::InvalidDomain,
            Self::Network { .. } | Self::Stream { .. } => ErrorKind::NetworkError,
            Self::UpstreamHttp { .. } => ErrorKind::UpstreamHttpError,
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::DuplicateDownload { .. } => ErrorKind::DuplicateDownload,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::Io,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Upstream status code, when the failure came from a non-success response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UpstreamHttp { status, .. } => Some(*status),
            Self::Network { source } => source.status(),
            _ => None,
        }
    }

    /// A 403 from a media host almost always means the session cookies expired.
    pub fn is_stale_session(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN)
    }

    /// Whether the request that produced this error may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { source } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            Self::UpstreamHttp { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}
