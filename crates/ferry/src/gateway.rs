//! Facade exposing the engine to a playback client.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::client::{Cookies, HttpClient};
use crate::config::EngineConfig;
use crate::download::{Anime, DownloadEvent, DownloadScheduler, Episode, TaskSnapshot};
use crate::error::{Error, Result};
use crate::guard::DomainGuard;
use crate::manifest::{ManifestFetcher, ManifestResponse};
use crate::relay::{RelayResponse, StreamRelay, StreamRequest};

/// Playlist proxy, stream relay and download scheduler sharing one HTTP client and one
/// domain allow-list.
#[derive(Debug, Clone)]
pub struct MediaGateway {
    guard: Arc<DomainGuard>,
    fetcher: ManifestFetcher,
    relay: StreamRelay,
    scheduler: DownloadScheduler,
}

impl MediaGateway {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = HttpClient::new(&config.client)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: HttpClient, config: &EngineConfig) -> Self {
        let guard = Arc::new(DomainGuard::new(&config.allowed_hosts));
        Self {
            fetcher: ManifestFetcher::new(client.clone(), Arc::clone(&guard)),
            relay: StreamRelay::new(client.clone(), Arc::clone(&guard)),
            scheduler: DownloadScheduler::new(client, Arc::clone(&guard), config.downloads.clone()),
            guard,
        }
    }

    pub fn guard(&self) -> &DomainGuard {
        &self.guard
    }

    pub fn scheduler(&self) -> &DownloadScheduler {
        &self.scheduler
    }

    pub async fn proxy_hls_playlist(&self, url: &str, cookies: &Cookies) -> Result<ManifestResponse> {
        self.fetcher.fetch_and_rewrite(url, cookies).await
    }

    pub async fn proxy_video_stream(&self, request: &StreamRequest) -> Result<RelayResponse> {
        self.relay.relay(request).await
    }

    pub fn enqueue_download(
        &self,
        anime: &Anime,
        episode: &Episode,
        source_url: &str,
    ) -> Result<TaskSnapshot> {
        self.scheduler.enqueue(anime, episode, source_url)
    }

    pub fn enqueue_download_with_cookies(
        &self,
        anime: &Anime,
        episode: &Episode,
        source_url: &str,
        cookies: Cookies,
    ) -> Result<TaskSnapshot> {
        self.scheduler
            .enqueue_with_cookies(anime, episode, source_url, cookies)
    }

    pub async fn cancel_download(&self, episode_id: &str) -> Result<()> {
        self.scheduler.cancel(episode_id).await
    }

    pub fn get_download_progress(&self, episode_id: &str) -> Result<TaskSnapshot> {
        self.scheduler
            .get_progress(episode_id)
            .ok_or_else(|| Error::NotFound {
                episode_id: episode_id.to_owned(),
            })
    }

    pub fn get_all_downloads(&self) -> Vec<TaskSnapshot> {
        self.scheduler.get_all()
    }

    pub fn clear_completed_downloads(&self) -> usize {
        self.scheduler.clear_completed()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.scheduler.subscribe()
    }
}
