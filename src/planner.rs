//! Segment planner: turns a probed total size into an ordered, gapless,
//! non-overlapping list of byte ranges covering `[0, total_size)`.
//!
//! The last segment absorbs any remainder so the partition is exact
//! regardless of divisibility. When the size is unknown or the server
//! cannot serve ranges, the plan collapses to a single segment.
use crate::config::DownloadConfig;
use crate::probe::Probe;
use crate::state::{Segment, SegmentStatus, OPEN_END};

/// Plans the segment list for a fresh download.
pub fn plan_segments(probe: &Probe, config: &DownloadConfig) -> Vec<Segment> {
    let total_size = match probe.total_size {
        // Unknown length: one open-ended segment streamed to EOF.
        None => return vec![Segment::new(0, 0, OPEN_END)],
        Some(n) => n,
    };

    if total_size == 0 {
        // Nothing to fetch; the single segment is born complete.
        let mut seg = Segment::new(0, 0, 0);
        seg.status = SegmentStatus::Done;
        return vec![seg];
    }

    if !probe.range_supported {
        return vec![Segment::new(0, 0, total_size)];
    }

    let splits = config.effective_splits(total_size);
    let seg_size = total_size / splits;

    let mut segments = Vec::with_capacity(splits as usize);
    for i in 0..splits {
        let start = i * seg_size;
        let end = if i == splits - 1 { total_size } else { start + seg_size };
        segments.push(Segment::new(i as usize, start, end));
    }
    segments
}

/// Checks that `segments` is an exact ordered partition of
/// `[0, total_size)`. Used to vet resume records before reusing their
/// boundaries; a record that fails this check is discarded whole.
pub fn is_exact_partition(segments: &[Segment], total_size: Option<u64>) -> bool {
    let Some(total) = total_size else {
        // Unknown size is only representable as one open-ended segment.
        return segments.len() == 1 && segments[0].start == 0 && segments[0].is_open_ended();
    };

    if segments.is_empty() {
        return false;
    }

    let mut expected_start = 0u64;
    for (i, seg) in segments.iter().enumerate() {
        if seg.index != i || seg.start != expected_start || seg.end < seg.start {
            return false;
        }
        if seg.is_open_ended() || seg.bytes_written > seg.len() {
            return false;
        }
        expected_start = seg.end;
    }
    expected_start == total
}
