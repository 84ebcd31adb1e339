//! Transfer progress accounting.

use std::time::{Duration, Instant};

/// `downloaded / total * 100`, capped at 100; 0 when the total is unknown.
pub fn percent(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded as f64 / total as f64 * 100.0).min(100.0)
}

/// Speed sampler owned by one transfer loop.
///
/// Each call to [`sample`](Self::sample) that lands at least one interval after the last
/// sample yields a fresh bytes-per-second figure and resets the window.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: Duration,
    last_sample_at: Instant,
    last_sample_bytes: u64,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_sample_at: now,
            last_sample_bytes: 0,
        }
    }

    pub fn last_sample_bytes(&self) -> u64 {
        self.last_sample_bytes
    }

    pub fn sample(&mut self, downloaded: u64) -> Option<f64> {
        self.sample_at(downloaded, Instant::now())
    }

    fn sample_at(&mut self, downloaded: u64, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last_sample_at);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }
        let delta = downloaded.saturating_sub(self.last_sample_bytes);
        let speed = delta as f64 / elapsed.as_secs_f64();
        self.last_sample_at = now;
        self.last_sample_bytes = downloaded;
        Some(speed)
    }
}
