//! # parget Download Library
//!
//! `parget` is a library for performing parallel, resumable file
//! downloads. It supports:
//! - Splitting a resource into byte-range segments fetched concurrently
//! - Resuming interrupted downloads from a persisted resume record
//! - Automatic retries with backoff on transient network failure
//! - Progress snapshots and events decoupled from any UI
//! - SHA-256 integrity verification
//!
//! The internal components are exposed so custom frontends can drive the
//! engine directly; the shipped binary is one such frontend.

pub mod args;
pub mod config;
pub mod downloader;
pub mod error;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod resolver;
pub mod state;
pub mod utils;
pub mod worker;

pub use args::Args;
pub use config::DownloadConfig;
pub use downloader::{DownloadJob, JobOutcome, JobPhase};
pub use error::{DownloadError, Result};
pub use probe::{probe_resource, Probe};
pub use progress::{JobEvent, ProgressSnapshot, ProgressTracker};
pub use resolver::{DirectResolver, Resolved, ResourceResolver};
pub use state::{ResumeRecord, ResumeStore, Segment, SegmentStatus};
