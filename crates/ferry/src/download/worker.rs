//! Transfer loop of a single download task.
//!
//! Single-file sources are relayed straight into the output file. Playlist sources are
//! resolved to a media playlist (following the first variant of master playlists), then the
//! init segment and media segments are relayed in order and appended to the same file.

use std::path::PathBuf;

use chrono::Utc;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use url::Url;

use super::events::DownloadEvent;
use super::progress::ProgressTracker;
use super::scheduler::SchedulerInner;
use crate::client::Cookies;
use crate::error::{Error, Result};
use crate::fs::create_file;
use crate::manifest::{ManifestResponse, PlaylistOutline, classify};
use crate::relay::{BodyStream, RelayResponse};
use crate::retry::retry_with_backoff;

const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// Everything a transfer needs, captured when the task is admitted.
#[derive(Debug, Clone)]
pub(super) struct TransferJob {
    pub episode_id: String,
    pub source: Url,
    pub output_path: PathBuf,
    pub cookies: Cookies,
}

/// Whether the URL path names an HLS playlist.
pub(super) fn is_playlist_source(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

pub(super) struct Transfer<'a> {
    inner: &'a SchedulerInner,
    job: &'a TransferJob,
    token: &'a CancellationToken,
    tracker: ProgressTracker,
    downloaded: u64,
}

impl<'a> Transfer<'a> {
    pub(super) fn new(
        inner: &'a SchedulerInner,
        job: &'a TransferJob,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            inner,
            job,
            token,
            tracker: ProgressTracker::new(inner.config.progress_interval()),
            downloaded: 0,
        }
    }

    /// Run the transfer to completion, returning the number of bytes written.
    pub(super) async fn run(mut self) -> Result<u64> {
        let job = self.job;
        if is_playlist_source(&job.source) {
            self.run_segmented().await?;
        } else {
            self.run_single().await?;
        }
        Ok(self.downloaded)
    }

    async fn run_single(&mut self) -> Result<()> {
        let job = self.job;
        let response = self.open(&job.source).await?;

        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        if classify(content_type, b"") {
            debug!(
                episode_id = %job.episode_id,
                "Source declared a playlist content type, switching to segmented transfer"
            );
            drop(response);
            return self.run_segmented().await;
        }

        let total = response.content_length().unwrap_or(0);
        self.inner.with_task(&job.episode_id, |task| task.total_bytes = total);

        let mut writer = self.create_output().await?;
        let result = self.copy_body(response.body, &mut writer).await;
        self.settle_output(writer, result).await
    }

    async fn run_segmented(&mut self) -> Result<()> {
        let job = self.job;
        let outline = self.resolve_media_playlist().await?;
        if let Some(method) = &outline.encryption {
            return Err(Error::unsupported(format!(
                "encrypted playlists are not supported (METHOD={method})"
            )));
        }

        let segments: Vec<Url> = outline
            .init_segment
            .into_iter()
            .chain(outline.segments)
            .collect();
        if segments.is_empty() {
            return Err(Error::unsupported("playlist lists no media segments"));
        }

        let total = segments.len();
        self.inner.with_task(&job.episode_id, |task| {
            task.segments_total = Some(total);
            task.segments_done = Some(0);
        });
        info!(episode_id = %job.episode_id, segments = total, "Downloading segmented source");

        let mut writer = self.create_output().await?;
        let result = self.append_segments(&segments, &mut writer).await;
        self.settle_output(writer, result).await
    }

    async fn append_segments(
        &mut self,
        segments: &[Url],
        writer: &mut BufWriter<File>,
    ) -> Result<()> {
        let job = self.job;
        for (index, segment) in segments.iter().enumerate() {
            let response = self.open(segment).await?;
            self.copy_body(response.body, writer).await?;
            self.inner
                .with_task(&job.episode_id, |task| task.segments_done = Some(index + 1));
            trace!(
                episode_id = %job.episode_id,
                segment = index + 1,
                total = segments.len(),
                "Segment appended"
            );
        }
        Ok(())
    }

    /// Fetch the source playlist, following the first variant of master playlists.
    async fn resolve_media_playlist(&self) -> Result<PlaylistOutline> {
        let max_depth = self.inner.config.max_playlist_depth;
        let mut url = self.job.source.clone();

        for depth in 0..=max_depth {
            let manifest = self.fetch_manifest(&url).await?;
            let Some(text) = manifest.playlist() else {
                return Err(Error::unsupported(format!("{url} is not an HLS playlist")));
            };

            let outline = PlaylistOutline::parse(text, &manifest.url);
            if !outline.is_master() {
                return Ok(outline);
            }
            let variant = &outline.variants[0];
            debug!(
                episode_id = %self.job.episode_id,
                depth,
                variant = %variant,
                "Following first variant of master playlist"
            );
            url = variant.clone();
        }

        Err(Error::unsupported(format!(
            "master playlists nested deeper than {max_depth} levels"
        )))
    }

    async fn fetch_manifest(&self, url: &Url) -> Result<ManifestResponse> {
        self.ensure_allowed(url)?;
        let fetcher = &self.inner.fetcher;
        let cookies = &self.job.cookies;
        tokio::select! {
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = retry_with_backoff(&self.inner.config.retry, self.token, move |_| {
                fetcher.fetch_url(url.clone(), cookies)
            }) => result,
        }
    }

    /// Open an upstream body. Retries only happen here, before any of its bytes are written.
    async fn open(&self, url: &Url) -> Result<RelayResponse> {
        self.ensure_allowed(url)?;
        let relay = &self.inner.relay;
        let cookies = &self.job.cookies;
        tokio::select! {
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = retry_with_backoff(&self.inner.config.retry, self.token, move |_| {
                relay.relay_url(url, cookies, None)
            }) => result,
        }
    }

    fn ensure_allowed(&self, url: &Url) -> Result<()> {
        if self.inner.guard.is_allowed(url) {
            Ok(())
        } else {
            Err(Error::invalid_domain(url.host_str().unwrap_or_default()))
        }
    }

    async fn create_output(&self) -> Result<BufWriter<File>> {
        let file = create_file(&self.job.output_path).await?;
        Ok(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file))
    }

    /// Close the output after a transfer attempt.
    ///
    /// On failure whatever was received is still flushed so the retained partial file is a
    /// prefix of the content. Cancelled output is removed by the scheduler.
    async fn settle_output(&self, mut writer: BufWriter<File>, result: Result<()>) -> Result<()> {
        let path = &self.job.output_path;
        match result {
            Ok(()) => {
                writer
                    .flush()
                    .await
                    .map_err(|e| Error::io_path("flushing", path, e))?;
                writer
                    .into_inner()
                    .sync_all()
                    .await
                    .map_err(|e| Error::io_path("syncing", path, e))
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                if let Err(flush_err) = writer.flush().await {
                    debug!(path = %path.display(), error = %flush_err, "Could not flush partial output");
                }
                Err(e)
            }
        }
    }

    /// Append a body to the output in receipt order until it ends or the task is cancelled.
    async fn copy_body(&mut self, mut body: BodyStream, writer: &mut BufWriter<File>) -> Result<()> {
        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(Error::Cancelled),
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    writer
                        .write_all(&bytes)
                        .await
                        .map_err(|e| Error::io_path("writing", &self.job.output_path, e))?;
                    self.advance(bytes.len() as u64);
                }
                Some(Err(e)) => return Err(Error::from(e)),
                None => return Ok(()),
            }
        }
    }

    /// Record received bytes and, once per sample interval, publish a progress event.
    fn advance(&mut self, bytes: u64) {
        self.downloaded += bytes;
        let downloaded = self.downloaded;
        let speed = self.tracker.sample(downloaded);
        let sample_bytes = self.tracker.last_sample_bytes();

        let progress = self
            .inner
            .with_task(&self.job.episode_id, |task| {
                task.downloaded_bytes = downloaded;
                task.last_update_time = Some(Utc::now());
                let speed = speed?;
                task.speed_bytes_per_sec = speed;
                task.last_downloaded_bytes_sample = sample_bytes;
                Some(task.progress())
            })
            .flatten();

        if let Some(progress) = progress
            && !self.token.is_cancelled()
        {
            self.inner.emit(DownloadEvent::Progress(progress));
        }
    }
}
