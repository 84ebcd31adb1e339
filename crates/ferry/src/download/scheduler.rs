//! Download scheduler.
//!
//! The scheduler is the only admission point for persistent downloads: at most
//! `max_concurrent` tasks are `downloading`, the rest wait in a FIFO queue and are promoted
//! as running tasks reach a terminal state.
//!
//! All bookkeeping lives behind one mutex that is never held across an `.await`. A task's
//! byte counters are written by its own transfer loop; lifecycle transitions happen here.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::DownloadEvent;
use super::filename::episode_filename;
use super::task::{Anime, DownloadStatus, DownloadTask, Episode, TaskSnapshot};
use super::worker::{Transfer, TransferJob};
use crate::client::{Cookies, HttpClient};
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fs::remove_file_if_exists;
use crate::guard::DomainGuard;
use crate::manifest::ManifestFetcher;
use crate::relay::StreamRelay;

/// Capacity of the progress broadcast channel. Slow subscribers lag rather than block.
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct ActiveTransfer {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub(super) struct State {
    registry: HashMap<String, DownloadTask>,
    queue: VecDeque<String>,
    active: HashMap<String, ActiveTransfer>,
}

pub(super) struct SchedulerInner {
    state: Mutex<State>,
    events: broadcast::Sender<DownloadEvent>,
    pub(super) fetcher: ManifestFetcher,
    pub(super) relay: StreamRelay,
    pub(super) guard: Arc<DomainGuard>,
    pub(super) config: DownloadConfig,
}

/// Bounded-concurrency download scheduler. Cheap to clone.
#[derive(Clone)]
pub struct DownloadScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for DownloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DownloadScheduler")
            .field("tasks", &state.registry.len())
            .field("queued", &state.queue.len())
            .field("active", &state.active.len())
            .finish()
    }
}

impl DownloadScheduler {
    pub fn new(client: HttpClient, guard: Arc<DomainGuard>, config: DownloadConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(State::default()),
                events,
                fetcher: ManifestFetcher::new(client.clone(), Arc::clone(&guard)),
                relay: StreamRelay::new(client, Arc::clone(&guard)),
                guard,
                config,
            }),
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.inner.config
    }

    /// Receive lifecycle and progress events for every task.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.events.subscribe()
    }

    pub fn enqueue(
        &self,
        anime: &Anime,
        episode: &Episode,
        source_url: &str,
    ) -> Result<TaskSnapshot> {
        self.enqueue_with_cookies(anime, episode, source_url, Cookies::new())
    }

    /// Register a download and start it now if a slot is free and nothing is queued ahead of
    /// it, otherwise queue it.
    ///
    /// Fails with `DuplicateDownload` while a pending or downloading task exists for the
    /// same episode. A terminal task of the same episode is replaced.
    pub fn enqueue_with_cookies(
        &self,
        anime: &Anime,
        episode: &Episode,
        source_url: &str,
        cookies: Cookies,
    ) -> Result<TaskSnapshot> {
        let source = self.inner.guard.check(source_url)?;
        let output_path = self
            .inner
            .config
            .output_dir
            .join(episode_filename(anime, episode, &source));

        let mut state = self.inner.state.lock();
        if let Some(existing) = state.registry.get(&episode.id)
            && !existing.status.is_terminal()
        {
            debug!(episode_id = %episode.id, status = %existing.status, "Rejecting duplicate download");
            return Err(Error::DuplicateDownload {
                episode_id: episode.id.clone(),
            });
        }

        let task = DownloadTask::new(anime, episode, &source, output_path, cookies);
        state.registry.insert(episode.id.clone(), task);

        // Older queued tasks always go first.
        state.queue.push_back(episode.id.clone());
        self.inner.promote(&mut state);
        if state.queue.contains(&episode.id) {
            info!(
                episode_id = %episode.id,
                queued = state.queue.len(),
                "Download queued, all slots busy"
            );
        }

        state
            .registry
            .get(&episode.id)
            .map(DownloadTask::snapshot)
            .ok_or_else(|| Error::NotFound {
                episode_id: episode.id.clone(),
            })
    }

    /// Cancel a pending or downloading task.
    ///
    /// A downloading task is interrupted and its partial file is removed before this returns.
    /// Cancelling a task that already finished is a no-op.
    pub async fn cancel(&self, episode_id: &str) -> Result<()> {
        let handle = {
            let mut state = self.inner.state.lock();
            let Some(status) = state.registry.get(episode_id).map(|task| task.status) else {
                return Err(Error::NotFound {
                    episode_id: episode_id.to_owned(),
                });
            };

            match status {
                DownloadStatus::Pending => {
                    state.queue.retain(|id| id != episode_id);
                    if let Some(task) = state.registry.get_mut(episode_id) {
                        task.status = DownloadStatus::Cancelled;
                        task.last_update_time = Some(Utc::now());
                    }
                    drop(state);
                    info!(episode_id, "Cancelled queued download");
                    self.inner.emit(DownloadEvent::Cancelled {
                        episode_id: episode_id.to_owned(),
                    });
                    return Ok(());
                }
                DownloadStatus::Downloading => match state.active.get_mut(episode_id) {
                    Some(active) => {
                        active.token.cancel();
                        active.handle.take()
                    }
                    None => None,
                },
                _ => {
                    debug!(episode_id, %status, "Cancel ignored, task already finished");
                    return Ok(());
                }
            }
        };

        info!(episode_id, "Cancelling download");
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            // The transfer never reported back, settle it here.
            error!(episode_id, error = %e, "Transfer task ended abnormally");
            self.inner.finish(episode_id, Err(Error::Cancelled)).await;
        }
        Ok(())
    }

    pub fn get_progress(&self, episode_id: &str) -> Option<TaskSnapshot> {
        self.inner
            .state
            .lock()
            .registry
            .get(episode_id)
            .map(DownloadTask::snapshot)
    }

    /// Every known task, oldest start first.
    pub fn get_all(&self) -> Vec<TaskSnapshot> {
        let state = self.inner.state.lock();
        let mut tasks: Vec<_> = state.registry.values().map(DownloadTask::snapshot).collect();
        tasks.sort_by(|a, b| {
            a.task
                .start_time
                .is_none()
                .cmp(&b.task.start_time.is_none())
                .then(a.task.start_time.cmp(&b.task.start_time))
                .then_with(|| a.task.episode_id.cmp(&b.task.episode_id))
        });
        tasks
    }

    /// Drop terminal tasks from the registry. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.registry.len();
        state.registry.retain(|_, task| !task.status.is_terminal());
        let removed = before - state.registry.len();
        debug!(removed, "Cleared finished downloads");
        removed
    }

    /// Number of tasks currently `downloading`.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }
}

impl SchedulerInner {
    fn max_concurrent(&self) -> usize {
        self.config.max_concurrent.max(1)
    }

    pub(super) fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Apply `f` to a registered task, returning its result.
    pub(super) fn with_task<R>(
        &self,
        episode_id: &str,
        f: impl FnOnce(&mut DownloadTask) -> R,
    ) -> Option<R> {
        self.state.lock().registry.get_mut(episode_id).map(f)
    }

    /// Move a pending task to `downloading` and spawn its transfer.
    fn admit(self: &Arc<Self>, state: &mut State, episode_id: &str) {
        let Some(task) = state.registry.get_mut(episode_id) else {
            return;
        };
        let now = Utc::now();
        task.status = DownloadStatus::Downloading;
        task.start_time = Some(now);
        task.last_update_time = Some(now);

        let job = TransferJob {
            episode_id: episode_id.to_owned(),
            source: task.source.clone(),
            output_path: task.output_path.clone(),
            cookies: task.cookies.clone(),
        };
        let output_path = job.output_path.clone();

        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = Transfer::new(&inner, &job, &child).run().await;
            inner.finish(&job.episode_id, outcome).await;
        });

        state.active.insert(
            episode_id.to_owned(),
            ActiveTransfer {
                token,
                handle: Some(handle),
            },
        );

        info!(
            episode_id,
            output = %output_path.display(),
            active = state.active.len(),
            "Download started"
        );
        self.emit(DownloadEvent::Started {
            episode_id: episode_id.to_owned(),
            output_path,
        });
    }

    /// Record the terminal state of a transfer and hand its slot to the next queued task.
    ///
    /// The output file, when it has to go, is removed while the task still holds its slot,
    /// so the episode cannot be enqueued again until the file is gone. Idempotent: a task
    /// that is already terminal is left as it is.
    pub(super) async fn finish(self: &Arc<Self>, episode_id: &str, outcome: Result<u64>) {
        let cleanup = {
            let state = self.state.lock();
            let Some(task) = state.registry.get(episode_id) else {
                return;
            };
            if task.status.is_terminal() {
                return;
            }
            match &outcome {
                Ok(_) => None,
                Err(Error::Cancelled) => Some(task.output_path.clone()),
                Err(_) => (!self.config.retain_failed_partials).then(|| task.output_path.clone()),
            }
        };

        if let Some(path) = cleanup {
            match remove_file_if_exists(&path).await {
                Ok(true) => debug!(episode_id, path = %path.display(), "Removed partial file"),
                Ok(false) => {}
                Err(e) => warn!(episode_id, error = %e, "Failed to remove partial file"),
            }
        }

        let mut state = self.state.lock();
        state.active.remove(episode_id);
        let Some(task) = state.registry.get_mut(episode_id) else {
            self.promote(&mut state);
            return;
        };
        if task.status.is_terminal() {
            self.promote(&mut state);
            return;
        }
        task.last_update_time = Some(Utc::now());
        task.speed_bytes_per_sec = 0.0;

        let event = match outcome {
            Ok(downloaded_bytes) => {
                task.status = DownloadStatus::Completed;
                task.downloaded_bytes = downloaded_bytes;
                info!(
                    episode_id,
                    bytes = downloaded_bytes,
                    output = %task.output_path.display(),
                    "Download completed"
                );
                DownloadEvent::Completed {
                    episode_id: episode_id.to_owned(),
                    output_path: task.output_path.clone(),
                    downloaded_bytes,
                }
            }
            Err(Error::Cancelled) => {
                task.status = DownloadStatus::Cancelled;
                info!(episode_id, bytes = task.downloaded_bytes, "Download cancelled");
                DownloadEvent::Cancelled {
                    episode_id: episode_id.to_owned(),
                }
            }
            Err(e) => {
                task.status = DownloadStatus::Failed;
                task.error = Some(e.to_string());
                task.error_kind = Some(e.kind());
                if e.is_stale_session() {
                    warn!(episode_id, error = %e, "Download failed, session cookies look stale");
                } else {
                    warn!(episode_id, error = %e, "Download failed");
                }
                DownloadEvent::Failed {
                    episode_id: episode_id.to_owned(),
                    kind: e.kind(),
                    error: e.to_string(),
                }
            }
        };

        // Terminal event first, then the `started` of whoever takes the slot.
        self.emit(event);
        self.promote(&mut state);
    }

    /// Start queued tasks, oldest first, while slots are free.
    fn promote(self: &Arc<Self>, state: &mut State) {
        while state.active.len() < self.max_concurrent() {
            let Some(next) = state.queue.pop_front() else {
                break;
            };
            let pending = state
                .registry
                .get(&next)
                .is_some_and(|task| task.status == DownloadStatus::Pending);
            if pending {
                debug!(episode_id = %next, "Promoting queued download");
                self.admit(state, &next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::ClientConfig;

    fn scheduler(dir: &std::path::Path, max_concurrent: usize) -> DownloadScheduler {
        let client = HttpClient::new(&ClientConfig::default()).unwrap();
        let guard = Arc::new(DomainGuard::new(["cdn.example.com"]));
        DownloadScheduler::new(
            client,
            guard,
            DownloadConfig {
                output_dir: dir.to_path_buf(),
                max_concurrent,
                ..Default::default()
            },
        )
    }

    fn anime() -> Anime {
        Anime {
            id: "show".into(),
            title: "Show".into(),
        }
    }

    fn episode(id: &str) -> Episode {
        Episode {
            id: id.into(),
            title: format!("Episode {id}"),
            url: format!("https://site.example/{id}"),
            number: None,
        }
    }

    #[tokio::test]
    async fn disallowed_source_is_rejected_before_registration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = scheduler(dir.path(), 2);
        let err = scheduler
            .enqueue(&anime(), &episode("1"), "https://evil.example.org/a.mp4")
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidDomain);
        assert!(scheduler.get_all().is_empty());
    }

    #[tokio::test]
    async fn unknown_episode_cannot_be_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = scheduler(dir.path(), 2);
        let err = scheduler.cancel("nope").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
        assert!(scheduler.get_progress("nope").is_none());
    }

    /// Register `id` directly, as the scheduler would have left it.
    fn register(scheduler: &DownloadScheduler, id: &str, status: DownloadStatus) -> PathBuf {
        let source = url::Url::parse(&format!("https://cdn.example.com/{id}.mp4")).unwrap();
        let output_path = scheduler.config().output_dir.join(format!("{id}.mp4"));
        let mut task = DownloadTask::new(
            &anime(),
            &episode(id),
            &source,
            output_path.clone(),
            Cookies::new(),
        );
        task.status = status;

        let mut state = scheduler.inner.state.lock();
        match status {
            DownloadStatus::Pending => state.queue.push_back(id.to_owned()),
            DownloadStatus::Downloading => {
                state.active.insert(
                    id.to_owned(),
                    ActiveTransfer {
                        token: CancellationToken::new(),
                        handle: None,
                    },
                );
            }
            _ => {}
        }
        state.registry.insert(id.to_owned(), task);
        output_path
    }

    fn status(scheduler: &DownloadScheduler, id: &str) -> DownloadStatus {
        scheduler.get_progress(id).unwrap().task.status
    }

    #[tokio::test]
    async fn new_task_waits_behind_queued_ones_even_with_a_free_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = scheduler(dir.path(), 1);
        register(&scheduler, "waiting", DownloadStatus::Pending);
        assert_eq!(scheduler.active_count(), 0);

        let late = scheduler
            .enqueue(&anime(), &episode("late"), "https://cdn.example.com/late.mp4")
            .unwrap();

        assert_eq!(late.task.status, DownloadStatus::Pending);
        assert_eq!(status(&scheduler, "waiting"), DownloadStatus::Downloading);
        assert_eq!(scheduler.active_count(), 1);
    }

    #[tokio::test]
    async fn finished_slot_goes_to_queue_head_after_file_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = scheduler(dir.path(), 1);
        let mut events = scheduler.subscribe();
        let running = register(&scheduler, "running", DownloadStatus::Downloading);
        register(&scheduler, "next", DownloadStatus::Pending);
        register(&scheduler, "after", DownloadStatus::Pending);
        std::fs::write(&running, b"partial").unwrap();

        scheduler
            .inner
            .finish("running", Err(Error::Cancelled))
            .await;

        assert!(!running.exists());
        assert_eq!(status(&scheduler, "running"), DownloadStatus::Cancelled);
        assert_eq!(status(&scheduler, "next"), DownloadStatus::Downloading);
        assert_eq!(status(&scheduler, "after"), DownloadStatus::Pending);
        assert_eq!(scheduler.active_count(), 1);

        let first = events.try_recv().unwrap();
        assert!(
            matches!(&first, DownloadEvent::Cancelled { episode_id } if episode_id == "running"),
            "{first:?}"
        );
        let second = events.try_recv().unwrap();
        assert!(
            matches!(&second, DownloadEvent::Started { episode_id, .. } if episode_id == "next"),
            "{second:?}"
        );

        // A second report for the same task changes nothing.
        scheduler.inner.finish("running", Ok(7)).await;
        assert_eq!(status(&scheduler, "running"), DownloadStatus::Cancelled);
    }
}
