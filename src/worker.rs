//! Segment worker: range-limited retrieval with positioned writes.
//!
//! Each worker owns exactly one segment and writes only inside its own
//! byte range, so workers never need mutual exclusion on the output file.
//! Progress is checkpointed by flushing to disk first and only then
//! recording the new byte count in the shared job state; a retry or a
//! resumed run continues from the last checkpoint, never from the start
//! of the segment.
use crate::error::{DownloadError, Result};
use crate::progress::ProgressTracker;
use crate::state::{JobState, SegmentStatus, OPEN_END};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a segment worker needs; cloned once per spawned task.
#[derive(Clone)]
pub struct WorkerContext {
    pub url: String,
    pub dest: PathBuf,
    pub range_supported: bool,
    /// Bytes buffered between flush-then-persist checkpoints.
    pub flush_threshold: u64,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub tracker: Arc<ProgressTracker>,
    pub state: Arc<Mutex<JobState>>,
    pub client: reqwest::Client,
    pub cancel: CancellationToken,
}

enum AttemptError {
    Cancelled,
    Transfer(String),
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Transfer(e.to_string())
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        AttemptError::Transfer(e.to_string())
    }
}

/// Downloads one segment to completion, retrying transient failures from
/// the last confirmed offset with a growing delay.
///
/// Exhausting the retry budget marks the segment `failed` and surfaces
/// [`DownloadError::SegmentTransferFailed`]; sibling workers are not
/// affected. Cancellation flushes and persists before returning.
pub async fn download_segment(ctx: WorkerContext, index: usize) -> Result<()> {
    let (start, end, mut flushed) = {
        let mut locked = ctx.state.lock().await;
        let seg = &mut locked.record.segments[index];
        if seg.is_done() {
            return Ok(());
        }
        seg.status = SegmentStatus::InProgress;
        (seg.start, seg.end, seg.bytes_written)
    };

    let mut attempt = 0;
    loop {
        attempt += 1;

        match run_attempt(&ctx, index, start, end, &mut flushed).await {
            Ok(()) => {
                let mut locked = ctx.state.lock().await;
                let seg = &mut locked.record.segments[index];
                seg.status = SegmentStatus::Done;
                seg.bytes_written = flushed;
                if seg.is_open_ended() {
                    // Length only becomes known at EOF.
                    seg.end = seg.start + flushed;
                }
                locked.persist().await;
                debug!(segment = index, bytes = flushed, "segment complete");
                return Ok(());
            }
            Err(AttemptError::Cancelled) => {
                // run_attempt already checkpointed whatever was flushed.
                return Err(DownloadError::Cancelled);
            }
            Err(AttemptError::Transfer(reason)) => {
                {
                    let mut locked = ctx.state.lock().await;
                    locked.record.segments[index].retries = attempt;
                }
                if attempt >= ctx.max_retries {
                    let mut locked = ctx.state.lock().await;
                    locked.record.segments[index].status = SegmentStatus::Failed;
                    locked.persist().await;
                    return Err(DownloadError::SegmentTransferFailed {
                        index,
                        attempts: attempt,
                        reason,
                    });
                }
                warn!(segment = index, attempt, %reason, "transfer error, retrying");
                // Progress beyond the last flush was never confirmed.
                ctx.tracker.reset(index, flushed);
                sleep(ctx.retry_delay * attempt).await;
            }
        }
    }
}

/// One transfer attempt, continuing from `start + *flushed`.
async fn run_attempt(
    ctx: &WorkerContext,
    index: usize,
    start: u64,
    end: u64,
    flushed: &mut u64,
) -> std::result::Result<(), AttemptError> {
    let resume_from = start + *flushed;
    if end != OPEN_END && resume_from >= end {
        return Ok(());
    }
    if ctx.cancel.is_cancelled() {
        return Err(AttemptError::Cancelled);
    }

    let mut request = ctx.client.get(&ctx.url);
    if ctx.range_supported {
        let range = if end == OPEN_END {
            format!("bytes={}-", resume_from)
        } else {
            format!("bytes={}-{}", resume_from, end - 1)
        };
        request = request.header(RANGE, range);
    }

    let mut response = request.send().await?;
    if !response.status().is_success() {
        return Err(AttemptError::Transfer(format!(
            "status code {}",
            response.status()
        )));
    }
    // A 200 in reply to a Range request means the server ignored the
    // header and is replaying the whole body; writing that at this
    // segment's offset would spill into sibling ranges.
    if ctx.range_supported && response.status() != StatusCode::PARTIAL_CONTENT {
        return Err(AttemptError::Transfer(format!(
            "server ignored the range request (status {})",
            response.status()
        )));
    }

    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&ctx.dest)
        .await?;
    let mut writer = BufWriter::new(file);
    writer.get_mut().seek(SeekFrom::Start(resume_from)).await?;

    // Servers without range support always replay the body from byte
    // zero; discard the prefix that is already durably on disk.
    let mut skip = if ctx.range_supported { 0 } else { *flushed };
    let mut unflushed = 0u64;

    loop {
        let chunk = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                checkpoint(ctx, index, flushed, &mut writer, &mut unflushed).await?;
                return Err(AttemptError::Cancelled);
            }
            chunk = response.chunk() => chunk?,
        };
        let Some(bytes) = chunk else { break };

        let bytes = if skip > 0 {
            let len = bytes.len() as u64;
            if len <= skip {
                skip -= len;
                continue;
            }
            let keep = bytes.slice(skip as usize..);
            skip = 0;
            keep
        } else {
            bytes
        };

        // Never write past the segment's end, even if the server
        // over-delivers.
        let bytes = if end == OPEN_END {
            bytes
        } else {
            let remaining = end - start - *flushed - unflushed;
            if remaining == 0 {
                break;
            }
            if (bytes.len() as u64) > remaining {
                bytes.slice(..remaining as usize)
            } else {
                bytes
            }
        };

        writer.write_all(&bytes).await?;
        unflushed += bytes.len() as u64;
        ctx.tracker.add(index, bytes.len() as u64);

        if unflushed >= ctx.flush_threshold {
            checkpoint(ctx, index, flushed, &mut writer, &mut unflushed).await?;
        }
    }

    checkpoint(ctx, index, flushed, &mut writer, &mut unflushed).await?;

    if end != OPEN_END && start + *flushed < end {
        return Err(AttemptError::Transfer(format!(
            "server closed the body {} bytes early",
            end - start - *flushed
        )));
    }
    Ok(())
}

/// Flushes buffered bytes to disk, then records the confirmed count in
/// the shared state. Ordering matters: the resume record must never
/// claim more bytes than the file actually holds.
async fn checkpoint(
    ctx: &WorkerContext,
    index: usize,
    flushed: &mut u64,
    writer: &mut BufWriter<tokio::fs::File>,
    unflushed: &mut u64,
) -> std::result::Result<(), AttemptError> {
    if *unflushed == 0 {
        return Ok(());
    }
    writer.flush().await?;
    writer.get_mut().sync_data().await?;
    *flushed += *unflushed;
    *unflushed = 0;

    let mut locked = ctx.state.lock().await;
    if let Some(seg) = locked.record.segments.get_mut(index) {
        seg.bytes_written = *flushed;
    }
    locked.persist().await;
    Ok(())
}
