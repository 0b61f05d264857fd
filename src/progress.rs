//! Progress aggregation.
//!
//! Workers bump one atomic counter per segment as bytes arrive; nothing in
//! here ever blocks a worker. The coordinator samples the counters into
//! copy-on-read [`ProgressSnapshot`]s and emits them on a [`JobEvent`]
//! channel, so rendering policy lives entirely with the consumer.
use crate::downloader::JobPhase;
use crate::state::Segment;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared, lock-free per-segment byte counters.
#[derive(Debug)]
pub struct ProgressTracker {
    counters: Vec<AtomicU64>,
    lengths: Vec<u64>,
    total_size: Option<u64>,
}

impl ProgressTracker {
    /// Builds a tracker for the planned segments, seeded with bytes
    /// already on disk from a resumed record.
    pub fn new(segments: &[Segment], total_size: Option<u64>) -> Arc<Self> {
        let counters = segments
            .iter()
            .map(|s| {
                let done = if s.is_done() { s.len() } else { s.bytes_written };
                AtomicU64::new(done)
            })
            .collect();
        let lengths = segments.iter().map(Segment::len).collect();
        Arc::new(Self {
            counters,
            lengths,
            total_size,
        })
    }

    /// Records `n` more bytes received for segment `index`.
    pub fn add(&self, index: usize, n: u64) {
        self.counters[index].fetch_add(n, Ordering::Relaxed);
    }

    /// Resets segment `index` to its last durably flushed byte count.
    /// Called when a worker retries from a confirmed offset.
    pub fn reset(&self, index: usize, flushed: u64) {
        self.counters[index].store(flushed, Ordering::Relaxed);
    }

    /// Copy-on-read view of the current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let segments: Vec<SegmentProgress> = self
            .counters
            .iter()
            .zip(&self.lengths)
            .enumerate()
            .map(|(index, (counter, &length))| SegmentProgress {
                index,
                bytes: counter.load(Ordering::Relaxed),
                length,
            })
            .collect();

        let downloaded = segments.iter().map(|s| s.bytes).sum();
        ProgressSnapshot {
            downloaded,
            total_size: self.total_size,
            segments,
        }
    }
}

/// Progress of one segment at sampling time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentProgress {
    pub index: usize,
    pub bytes: u64,
    /// Planned length; zero when the total size is unknown.
    pub length: u64,
}

impl SegmentProgress {
    /// Completion percentage, or `None` when the length is unknown.
    pub fn percent(&self) -> Option<f64> {
        if self.length == 0 {
            None
        } else {
            Some(self.bytes as f64 * 100.0 / self.length as f64)
        }
    }
}

/// Ephemeral aggregate view, recomputed on demand and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub downloaded: u64,
    pub total_size: Option<u64>,
    pub segments: Vec<SegmentProgress>,
}

impl ProgressSnapshot {
    /// Aggregate percentage, or `None` when the total size is unknown.
    pub fn percent(&self) -> Option<f64> {
        self.total_size.map(|total| {
            if total == 0 {
                100.0
            } else {
                self.downloaded as f64 * 100.0 / total as f64
            }
        })
    }
}

/// Events emitted by the coordinator while a job runs.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Phase(JobPhase),
    /// The segment plan is final; carries the plan so consumers can set up
    /// per-segment reporting before any bytes move.
    Planned {
        total_size: Option<u64>,
        segments: Vec<Segment>,
        resumed: bool,
    },
    Progress(ProgressSnapshot),
}
