//! Download task record and its lifecycle states.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::events::ProgressSnapshot;
use super::progress::percent;
use crate::client::Cookies;
use crate::error::ErrorKind;

/// Series an episode belongs to, as resolved by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anime {
    pub id: String,
    pub title: String,
}

/// Episode as resolved by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub title: String,
    /// Catalog page of the episode
    pub url: String,
    #[serde(default)]
    pub number: Option<u32>,
}

/// Lifecycle of a download task.
///
/// `Pending -> Downloading -> {Completed | Failed | Cancelled}`. Terminal states never change;
/// retrying means enqueueing a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persistent episode download, keyed by `episode_id`.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub episode_id: String,
    pub anime_id: String,
    pub anime_title: String,
    pub episode_title: String,
    pub source_url: String,
    pub output_path: PathBuf,
    pub status: DownloadStatus,
    /// From upstream `Content-Length`; 0 when unknown
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub last_update_time: Option<DateTime<Utc>>,
    pub last_downloaded_bytes_sample: u64,
    pub speed_bytes_per_sec: f64,
    /// Segment counters, only for playlist sources
    pub segments_done: Option<usize>,
    pub segments_total: Option<usize>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    #[serde(skip)]
    pub(crate) source: Url,
    #[serde(skip)]
    pub(crate) cookies: Cookies,
}

impl DownloadTask {
    pub(crate) fn new(
        anime: &Anime,
        episode: &Episode,
        source: &Url,
        output_path: PathBuf,
        cookies: Cookies,
    ) -> Self {
        Self {
            episode_id: episode.id.clone(),
            anime_id: anime.id.clone(),
            anime_title: anime.title.clone(),
            episode_title: episode.title.clone(),
            source_url: source.to_string(),
            output_path,
            status: DownloadStatus::Pending,
            total_bytes: 0,
            downloaded_bytes: 0,
            start_time: None,
            last_update_time: None,
            last_downloaded_bytes_sample: 0,
            speed_bytes_per_sec: 0.0,
            segments_done: None,
            segments_total: None,
            error: None,
            error_kind: None,
            source: source.clone(),
            cookies,
        }
    }

    /// Completion percentage in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        if self.status == DownloadStatus::Completed {
            return 100.0;
        }
        percent(self.downloaded_bytes, self.total_bytes)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            episode_id: self.episode_id.clone(),
            percent: self.percent(),
            speed_bytes_per_sec: self.speed_bytes_per_sec,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            segments_done: self.segments_done,
            segments_total: self.segments_total,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            percent: self.percent(),
            task: self.clone(),
        }
    }
}

/// Point-in-time copy of a task handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub task: DownloadTask,
    pub percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> DownloadTask {
        DownloadTask::new(
            &Anime {
                id: "a".into(),
                title: "Show".into(),
            },
            &Episode {
                id: "e1".into(),
                title: "Episode 1".into(),
                url: "https://site.example/e1".into(),
                number: Some(1),
            },
            &Url::parse("https://cdn.example.com/e1.mp4").unwrap(),
            PathBuf::from("Show_EP01.mp4"),
            Cookies::new(),
        )
    }

    #[test]
    fn terminal_states() {
        assert!(!DownloadStatus::Pending.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(DownloadStatus::Cancelled.is_terminal());
    }

    #[test]
    fn percent_is_zero_without_total_and_full_once_completed() {
        let mut task = task();
        task.downloaded_bytes = 4096;
        assert_eq!(task.percent(), 0.0);

        task.total_bytes = 8192;
        assert_eq!(task.percent(), 50.0);

        task.status = DownloadStatus::Completed;
        assert_eq!(task.percent(), 100.0);
    }

    #[test]
    fn snapshot_serializes_flat_without_cookies() {
        let mut task = task();
        task.cookies.insert("session".into(), "secret".into());
        let json = serde_json::to_value(task.snapshot()).unwrap();
        assert_eq!(json["episode_id"], "e1");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["percent"], 0.0);
        assert!(json.get("cookies").is_none());
    }
}
