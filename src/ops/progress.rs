//! Progress accounting for one job: frame counters, throughput, and the
//! periodic `ProgressInfo` snapshots emitted to the event stream.

use std::time::Instant;

use uuid::Uuid;

/// Point-in-time job progress. Emitted periodically; never persisted.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub id: Uuid,
    /// 0.0..=100.0; stays at 0.0 when the total is unknown.
    pub percent: f64,
    pub processed_frames: u64,
    pub total_frames: u64,
    /// Processing throughput since the job started.
    pub fps: f64,
    pub elapsed_seconds: f64,
    /// Remaining-time estimate; `None` until there is enough signal.
    pub estimated_remaining_seconds: Option<f64>,
    /// Current pipeline phase, e.g. "transcoding", "flushing".
    pub phase: &'static str,
}

/// Tracks counters for one job and decides when a snapshot is due.
pub struct ProgressTracker {
    id: Uuid,
    started: Instant,
    total_frames: u64,
    processed_frames: u64,
    /// Emit a snapshot every this many processed frames.
    interval: u64,
}

impl ProgressTracker {
    pub fn new(id: Uuid, total_frames: u64, interval: u64) -> Self {
        Self {
            id,
            started: Instant::now(),
            total_frames,
            processed_frames: 0,
            interval: interval.max(1),
        }
    }

    /// Count one processed frame; returns a snapshot when one is due.
    pub fn tick(&mut self, phase: &'static str) -> Option<ProgressInfo> {
        self.processed_frames += 1;
        if self.processed_frames % self.interval == 0 {
            Some(self.snapshot(phase))
        } else {
            None
        }
    }

    pub fn snapshot(&self, phase: &'static str) -> ProgressInfo {
        let elapsed = self.started.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.processed_frames as f64 / elapsed
        } else {
            0.0
        };
        let percent = if self.total_frames > 0 {
            (self.processed_frames as f64 / self.total_frames as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        let estimated_remaining_seconds = if fps > 0.0 && self.total_frames > self.processed_frames
        {
            Some((self.total_frames - self.processed_frames) as f64 / fps)
        } else {
            None
        };
        ProgressInfo {
            id: self.id,
            percent,
            processed_frames: self.processed_frames,
            total_frames: self.total_frames,
            fps,
            elapsed_seconds: elapsed,
            estimated_remaining_seconds,
            phase,
        }
    }
}
