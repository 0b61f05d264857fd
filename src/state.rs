//! Segment data model and the persistent resume store.
//!
//! The structures in this module are serialized to disk as JSON to enable
//! crash recovery and resuming partially completed downloads. A record is
//! keyed by a stable hash of (URL, destination path) and saved with a
//! write-temp-then-rename so a crash never leaves a half-written record.
use crate::error::{DownloadError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sentinel end offset for a segment whose total size is unknown: the
/// worker streams until EOF instead of a fixed range.
pub const OPEN_END: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// A contiguous byte range `[start, end)` of the target resource,
/// downloaded independently of its siblings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Segment {
    /// Position in the plan, used for reporting and resume lookups.
    pub index: usize,
    /// First byte of the range (0-based).
    pub start: u64,
    /// One past the last byte of the range, or [`OPEN_END`].
    pub end: u64,
    pub status: SegmentStatus,
    /// Bytes durably flushed to disk for this segment. Never counts
    /// buffered bytes, so a resume can trust it.
    #[serde(default)]
    pub bytes_written: u64,
    /// Transfer attempts consumed so far.
    #[serde(default)]
    pub retries: u32,
}

impl Segment {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end,
            status: SegmentStatus::Pending,
            bytes_written: 0,
            retries: 0,
        }
    }

    /// Length of the range; zero for open-ended segments.
    pub fn len(&self) -> u64 {
        if self.is_open_ended() {
            0
        } else {
            self.end - self.start
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && !self.is_open_ended()
    }

    pub fn is_open_ended(&self) -> bool {
        self.end == OPEN_END
    }

    pub fn is_done(&self) -> bool {
        self.status == SegmentStatus::Done
    }

    /// Offset the next transfer attempt should continue from.
    pub fn resume_offset(&self) -> u64 {
        self.start + self.bytes_written
    }
}

/// Persistent state of one download job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// Stable identity hash of (URL, destination path).
    pub key: String,
    pub url: String,
    pub total_size: Option<u64>,
    pub range_supported: bool,
    pub segments: Vec<Segment>,
}

impl ResumeRecord {
    /// Sum of durably written bytes across all segments.
    pub fn bytes_written(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| if s.is_done() { s.len() } else { s.bytes_written })
            .sum()
    }
}

/// Stable identifier for a (URL, destination) pair.
pub fn job_key(url: &str, dest: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(dest.to_string_lossy().as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// On-disk resume record store, one record per destination file, stored
/// beside it as `<dest>.resume.json`.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    path: PathBuf,
    key: String,
}

impl ResumeStore {
    pub fn new(url: &str, dest: &Path) -> Self {
        let mut name = dest.as_os_str().to_owned();
        name.push(".resume.json");
        Self {
            path: PathBuf::from(name),
            key: job_key(url, dest),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads a usable record, or `None` when there is nothing to resume.
    ///
    /// A record is usable only if it belongs to this job and its recorded
    /// total size matches the fresh probe. Anything else is discarded
    /// whole; partially-applicable records are never returned.
    pub async fn load(&self, probed_total: Option<u64>) -> Option<ResumeRecord> {
        let json = tokio::fs::read_to_string(&self.path).await.ok()?;
        let record: ResumeRecord = match serde_json::from_str(&json) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable resume record, discarding");
                return None;
            }
        };

        if record.key != self.key {
            debug!("resume record belongs to a different job, discarding");
            return None;
        }
        if record.total_size != probed_total {
            warn!(
                recorded = ?record.total_size,
                probed = ?probed_total,
                "resource size changed since the record was written, restarting"
            );
            return None;
        }
        Some(record)
    }

    /// Persists the record atomically: write to a temp file, fsync, rename.
    pub async fn save(&self, record: &ResumeRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| DownloadError::StateStoreFailure(e.to_string()))?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let write = async {
            tokio::fs::write(&tmp, json.as_bytes()).await?;
            let file = tokio::fs::File::open(&tmp).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path).await
        };
        write
            .await
            .map_err(|e: std::io::Error| DownloadError::StateStoreFailure(e.to_string()))
    }

    /// Removes the record after successful finalization.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::StateStoreFailure(e.to_string())),
        }
    }
}

/// Live job state shared between the coordinator and its workers: the
/// in-memory resume record plus the store it is persisted to.
///
/// Segment downloads are fully parallel, but every record write funnels
/// through the one lock wrapping this struct, so the store never sees
/// concurrent unsynchronized writes.
#[derive(Debug)]
pub struct JobState {
    pub record: ResumeRecord,
    store: Option<ResumeStore>,
}

impl JobState {
    pub fn new(record: ResumeRecord, store: ResumeStore) -> Self {
        Self {
            record,
            store: Some(store),
        }
    }

    pub fn is_resumable(&self) -> bool {
        self.store.is_some()
    }

    /// Saves the record. A store failure downgrades the job to
    /// non-resumable instead of aborting it; resumability is an
    /// optimization, not a correctness requirement.
    pub async fn persist(&mut self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.record).await {
                warn!(error = %e, "resume store write failed, continuing without resume support");
                self.store = None;
            }
        }
    }

    /// Removes the on-disk record after successful finalization.
    pub async fn clear(&mut self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear().await {
                warn!(error = %e, "could not remove resume record");
            }
        }
    }
}
