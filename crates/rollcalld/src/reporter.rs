//! Per-pipeline status counters and periodic reporting.
//!
//! One reporter per pipeline instance; nothing here is shared between
//! camera pipelines. Reporting is side-effect-only and never feeds
//! back into matching or commit decisions.

use std::time::{Duration, Instant};

/// Final counters returned when a pipeline stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSummary {
    pub frames_processed: u64,
    /// Frames in which at least one face was detected.
    pub successful_detections: u64,
    pub matches: u64,
    pub commits: u64,
    pub skips: u64,
    pub reconnects: u64,
}

pub struct StatusReporter {
    interval: Duration,
    started: Instant,
    last_emit: Instant,
    counters: PipelineSummary,
}

impl StatusReporter {
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            started: now,
            last_emit: now,
            counters: PipelineSummary::default(),
        }
    }

    pub fn note_frame(&mut self) {
        self.counters.frames_processed += 1;
    }

    pub fn note_detection_frame(&mut self) {
        self.counters.successful_detections += 1;
    }

    pub fn note_match(&mut self) {
        self.counters.matches += 1;
    }

    pub fn note_commit(&mut self) {
        self.counters.commits += 1;
    }

    pub fn note_skip(&mut self) {
        self.counters.skips += 1;
    }

    /// Sync the reconnect total from the stream adapter. Emits a status
    /// line immediately when it grew.
    pub fn sync_reconnects(&mut self, total: u64, connected: bool) {
        if total > self.counters.reconnects {
            self.counters.reconnects = total;
            self.emit("reconnect", connected);
        }
    }

    /// Emit a status line when the reporting interval has elapsed.
    pub fn maybe_emit(&mut self, connected: bool) {
        if self.last_emit.elapsed() >= self.interval {
            self.emit("interval", connected);
        }
    }

    fn emit(&mut self, reason: &str, connected: bool) {
        let c = &self.counters;
        tracing::info!(
            reason,
            connected,
            frames = c.frames_processed,
            detections = c.successful_detections,
            matches = c.matches,
            commits = c.commits,
            skips = c.skips,
            reconnects = c.reconnects,
            uptime_secs = self.started.elapsed().as_secs(),
            "status"
        );
        self.last_emit = Instant::now();
    }

    pub fn summary(&self) -> PipelineSummary {
        self.counters
    }
}
