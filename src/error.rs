//! Error taxonomy for the download engine.
//!
//! Fatal job-level failures are distinguished from locally-recovered ones:
//! segment transfer errors are retried inside the worker and only surface
//! here once retries are exhausted, while an invalid resume record is not an
//! error the caller ever sees (it silently triggers fresh planning).
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The metadata probe was rejected or the resource is unreachable.
    /// Fatal before any segment work begins.
    #[error("probe failed for {url}: {reason}")]
    ProbeFailed { url: String, reason: String },

    /// A segment exhausted its retry budget. The job fails but completed
    /// sibling segments stay on disk and in the resume record.
    #[error("segment {index} failed after {attempts} attempts: {reason}")]
    SegmentTransferFailed {
        index: usize,
        attempts: u32,
        reason: String,
    },

    /// A persisted resume record does not match the current probe
    /// (size or boundary mismatch). Discarded, never partially applied.
    #[error("resume record invalid: {0}")]
    ResumeRecordInvalid(String),

    /// Assembled output size disagrees with the probed total. Indicates
    /// silent corruption rather than a network fault.
    #[error("integrity mismatch: expected {expected} bytes on disk, found {actual}")]
    IntegrityMismatch { expected: u64, actual: u64 },

    /// Post-download SHA-256 check failed.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The resume store could not be read or written. Callers downgrade to
    /// a non-resumable download instead of aborting.
    #[error("state store failure: {0}")]
    StateStoreFailure(String),

    /// The job was cancelled. Progress up to the last flush is persisted
    /// and resumable.
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
