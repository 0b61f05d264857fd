//! Typed download configuration and the dynamic sizing policy.
//!
//! All knobs live in one struct with documented defaults. When `splits` or
//! `chunk_size` are not overridden, sizing scales with the probed total:
//! small files get few segments, large files more, bounded so we never
//! issue pathological numbers of tiny range requests.
use crate::error::{DownloadError, Result};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Configuration for a single download job, validated once at job start.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Override the dynamic segment count.
    pub splits: Option<u64>,
    /// Override the dynamic streaming/flush granularity, in bytes.
    pub chunk_size: Option<u64>,
    /// Segments are never planned smaller than this (default 1 MiB).
    pub min_segment_size: u64,
    /// Hard cap on the number of segments (default 32).
    pub max_segments: u64,
    /// Retry budget per segment for transient transfer errors (default 5).
    pub max_retries: u32,
    /// Base delay between retries; grows linearly per attempt (default 2s).
    pub retry_delay: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            splits: None,
            chunk_size: None,
            min_segment_size: MIB,
            max_segments: 32,
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl DownloadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.splits == Some(0) {
            return Err(DownloadError::InvalidConfig("splits must be at least 1".into()));
        }
        if self.chunk_size == Some(0) {
            return Err(DownloadError::InvalidConfig("chunk size must be non-zero".into()));
        }
        if self.max_segments == 0 {
            return Err(DownloadError::InvalidConfig("max_segments must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of segments to plan for a file of `total_size` bytes.
    ///
    /// Dynamic tiers: under 100 MiB -> 4, under 1 GiB -> 8, otherwise 16.
    /// The result is clamped so no segment falls below `min_segment_size`
    /// and the count never exceeds `max_segments` or the byte count itself.
    pub fn effective_splits(&self, total_size: u64) -> u64 {
        if total_size == 0 {
            return 1;
        }

        let mut splits = self.splits.unwrap_or_else(|| {
            if total_size < 100 * MIB {
                4
            } else if total_size < 1024 * MIB {
                8
            } else {
                16
            }
        });

        splits = splits.clamp(1, self.max_segments);

        // Only shrink auto-derived counts; an explicit override is honored
        // as long as every segment gets at least one byte.
        if self.splits.is_none() {
            while splits > 1 && total_size / splits < self.min_segment_size {
                splits -= 1;
            }
        }

        splits.min(total_size)
    }

    /// Streaming read/flush granularity: at most 4 MiB, never larger than
    /// an equal share of the file, never zero.
    pub fn effective_chunk_size(&self, total_size: u64, splits: u64) -> u64 {
        if let Some(size) = self.chunk_size {
            return size;
        }
        let per_split = if splits > 0 { total_size / splits } else { total_size };
        (4 * MIB).min(per_split).max(1)
    }
}
