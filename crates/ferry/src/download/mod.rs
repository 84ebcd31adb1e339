//! Persistent episode downloads: task state machine, transfer loop and scheduler.

mod events;
mod filename;
mod progress;
mod scheduler;
mod task;
mod worker;

pub use events::{DownloadEvent, ProgressSnapshot};
pub use filename::{episode_filename, infer_extension, sanitize_filename};
pub use progress::{ProgressTracker, percent};
pub use scheduler::DownloadScheduler;
pub use task::{Anime, DownloadStatus, DownloadTask, Episode, TaskSnapshot};
