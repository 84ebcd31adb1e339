use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::proxy::ProxyConfig;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Settings for the shared upstream HTTP client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User agent string
    pub user_agent: String,

    /// Time allowed to establish a connection
    pub connect_timeout_secs: u64,

    /// Maximum silence between two body chunks. `0` leaves it to the transport.
    pub read_timeout_secs: u64,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing
    pub pool_idle_timeout_secs: u64,

    /// Extra headers sent with every upstream request (e.g. `Referer`)
    pub headers: Vec<(String, String)>,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    pub danger_accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            connect_timeout_secs: 10,
            read_timeout_secs: 0,
            pool_max_idle_per_host: 20,
            pool_idle_timeout_secs: 30,
            headers: Vec::new(),
            proxy: None,
            danger_accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

/// Settings for persistent downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory that receives finished episode files
    pub output_dir: PathBuf,

    /// Maximum number of tasks in `downloading` at once
    pub max_concurrent: usize,

    /// How often speed is recomputed and a progress event is emitted
    pub progress_interval_ms: u64,

    /// Keep the partial file of a failed task on disk
    pub retain_failed_partials: bool,

    /// Nested master playlists followed before giving up
    pub max_playlist_depth: usize,

    /// Retry policy for requests that fail before any byte was written
    pub retry: RetryPolicy,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            max_concurrent: 2,
            progress_interval_ms: 1000,
            retain_failed_partials: true,
            max_playlist_depth: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl DownloadConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upstream media host suffixes the engine may contact
    pub allowed_hosts: Vec<String>,
    pub client: ClientConfig,
    pub downloads: DownloadConfig,
}
