//! Ferry media acquisition engine.
//!
//! Rewrites HLS playlists so relative references resolve on the playlist's own origin,
//! relays byte ranges of media files with session cookies attached, and runs persistent
//! episode downloads under a concurrency ceiling with progress events and cancellation.
//!
//! Every outbound request is checked against a [`DomainGuard`] allow-list first.

pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod gateway;
pub mod guard;
pub mod manifest;
pub mod proxy;
pub mod relay;
pub mod retry;

pub use client::{Cookies, HttpClient, install_rustls_provider};
pub use config::{ClientConfig, DownloadConfig, EngineConfig};
pub use download::{
    Anime, DownloadEvent, DownloadScheduler, DownloadStatus, DownloadTask, Episode,
    ProgressSnapshot, TaskSnapshot,
};
pub use error::{Error, ErrorKind, Result};
pub use gateway::MediaGateway;
pub use guard::DomainGuard;
pub use manifest::{ManifestBody, ManifestFetcher, ManifestResponse, rewrite_playlist};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use relay::{RelayResponse, StreamRelay, StreamRequest};
pub use retry::RetryPolicy;
