//! Notifications published on the scheduler's broadcast channel.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::ErrorKind;

/// Progress of one downloading task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub episode_id: String,
    pub percent: f64,
    pub speed_bytes_per_sec: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments_done: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments_total: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started {
        episode_id: String,
        output_path: PathBuf,
    },
    Progress(ProgressSnapshot),
    Completed {
        episode_id: String,
        output_path: PathBuf,
        downloaded_bytes: u64,
    },
    Failed {
        episode_id: String,
        kind: ErrorKind,
        error: String,
    },
    Cancelled {
        episode_id: String,
    },
}

impl DownloadEvent {
    pub fn episode_id(&self) -> &str {
        match self {
            Self::Started { episode_id, .. }
            | Self::Completed { episode_id, .. }
            | Self::Failed { episode_id, .. }
            | Self::Cancelled { episode_id } => episode_id,
            Self::Progress(progress) => &progress.episode_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// Short event name, also used as the SSE event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Progress(_) => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
