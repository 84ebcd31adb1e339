use std::path::Path;

use ferry_engine::{Anime, DownloadEvent, Episode, ManifestBody, MediaGateway, StreamRequest};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio::io::{self, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::{ApiServer, AppState};
use crate::config::AppConfig;
use crate::cookies::parse_cookies;
use crate::error::{AppError, Result};

/// Details of the episode handed to `ferry download`.
#[derive(Debug)]
pub struct DownloadArgs {
    pub source_url: String,
    pub anime: Anime,
    pub episode: Episode,
    pub cookies: Vec<String>,
}

pub struct CommandExecutor {
    config: AppConfig,
}

impl CommandExecutor {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn gateway(&self) -> Result<MediaGateway> {
        if self.config.allowed_hosts.is_empty() {
            warn!("No allowed hosts configured; every upstream request will be rejected");
        }
        Ok(MediaGateway::new(&self.config.engine())?)
    }

    pub async fn playlist(&self, url: &str, cookies: &[String], output: Option<&Path>) -> Result<()> {
        let cookies = parse_cookies(cookies)?;
        let manifest = self.gateway()?.proxy_hls_playlist(url, &cookies).await?;

        match (&manifest.body, output) {
            (_, Some(path)) => {
                let content = manifest.content();
                tokio::fs::write(path, &content).await?;
                info!(
                    path = %path.display(),
                    bytes = content.len(),
                    playlist = manifest.is_playlist(),
                    "Saved response"
                );
            }
            (ManifestBody::Playlist(text), None) => {
                let mut stdout = io::stdout();
                stdout.write_all(text.as_bytes()).await?;
                stdout.flush().await?;
            }
            (ManifestBody::Binary(_), None) => {
                return Err(AppError::InvalidArgument(format!(
                    "{} is not a playlist ({}); use --output to save it",
                    manifest.url,
                    manifest
                        .content_type
                        .as_deref()
                        .unwrap_or("unknown content type")
                )));
            }
        }
        Ok(())
    }

    pub async fn relay(
        &self,
        url: &str,
        range: Option<&str>,
        cookies: &[String],
        output: Option<&Path>,
    ) -> Result<()> {
        let mut request = StreamRequest::new(url).with_cookies(parse_cookies(cookies)?);
        if let Some(range) = range {
            request = request.with_range(range);
        }

        let mut response = self.gateway()?.proxy_video_stream(&request).await?;
        info!(
            status = %response.status,
            content_length = ?response.content_length(),
            "Relaying upstream response"
        );

        let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match output {
            Some(path) => Box::new(BufWriter::new(File::create(path).await?)),
            None => Box::new(io::stdout()),
        };

        let mut written = 0u64;
        while let Some(chunk) = response.body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        debug!(bytes = written, "Relay finished");
        Ok(())
    }

    pub async fn download(&self, args: DownloadArgs) -> Result<()> {
        let gateway = self.gateway()?;
        let cookies = parse_cookies(&args.cookies)?;
        let episode_id = args.episode.id.clone();

        let mut events = gateway.subscribe();
        let task = gateway.enqueue_download_with_cookies(
            &args.anime,
            &args.episode,
            &args.source_url,
            cookies,
        )?;
        info!(
            episode_id = %episode_id,
            path = %task.task.output_path.display(),
            "Download queued"
        );

        let bar = progress_bar();
        let mut cancelling = false;

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c(), if !cancelling => {
                    signal?;
                    cancelling = true;
                    bar.set_message("cancelling...");
                    gateway.cancel_download(&episode_id).await?;
                }
                event = events.recv() => match event {
                    Ok(event) if event.episode_id() != episode_id => {}
                    Ok(DownloadEvent::Started { output_path, .. }) => {
                        bar.set_message(file_name(&output_path));
                    }
                    Ok(DownloadEvent::Progress(progress)) => {
                        if progress.total_bytes > 0 {
                            bar.set_length(progress.total_bytes);
                        }
                        bar.set_position(progress.downloaded_bytes);
                        if let (Some(done), Some(total)) =
                            (progress.segments_done, progress.segments_total)
                        {
                            bar.set_message(format!("segment {done}/{total}"));
                        }
                    }
                    Ok(DownloadEvent::Completed { output_path, downloaded_bytes, .. }) => {
                        bar.set_length(downloaded_bytes);
                        bar.finish_with_message("done");
                        println!("{}", output_path.display());
                        return Ok(());
                    }
                    Ok(DownloadEvent::Failed { error, .. }) => {
                        bar.abandon_with_message("failed");
                        return Err(AppError::DownloadFailed { episode_id, error });
                    }
                    Ok(DownloadEvent::Cancelled { .. }) => {
                        bar.abandon_with_message("cancelled");
                        return Err(AppError::DownloadCancelled(episode_id));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Progress display lagged behind");
                    }
                    Err(RecvError::Closed) => {
                        bar.abandon();
                        return Err(AppError::DownloadCancelled(episode_id));
                    }
                },
            }
        }
    }

    pub async fn serve(&self) -> Result<()> {
        let server = ApiServer::new(
            self.config.server.bind,
            AppState::new(self.gateway()?),
        );

        let token = server.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        server.run().await
    }
}

fn progress_bar() -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.yellow} [{bar:30.yellow/white}] {bytes}/{total_bytes} {bytes_per_sec} {msg}")
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(0);
    bar.set_style(style);
    bar
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
