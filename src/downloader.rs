//! The download coordinator: orchestrates probing, planning, workers,
//! progress emission and finalization for a single job.
//!
//! A job moves through `Idle -> Probing -> Planning -> Downloading ->
//! Finalizing -> {Completed | Failed}`. Terminal states are only left by
//! starting a brand-new job.
use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::planner::{is_exact_partition, plan_segments};
use crate::probe::probe_resource;
use crate::progress::{JobEvent, ProgressTracker};
use crate::state::{JobState, ResumeRecord, ResumeStore};
use crate::worker::{download_segment, WorkerContext};
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Flush granularity when the total size is unknown and no override is
/// configured.
const FALLBACK_FLUSH: u64 = 4 * 1024 * 1024;

/// How often a progress event is emitted while downloading.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Probing,
    Planning,
    Downloading,
    Finalizing,
    Completed,
    Failed,
}

/// What a finished job looked like.
#[derive(Debug, Clone, Copy)]
pub struct JobOutcome {
    pub total_size: Option<u64>,
    pub bytes_written: u64,
    /// Whether a usable resume record was picked up at start.
    pub resumed: bool,
}

/// A single download job. Owns the job's state machine for its lifetime.
pub struct DownloadJob {
    url: String,
    dest: PathBuf,
    config: DownloadConfig,
    client: reqwest::Client,
    cancel: CancellationToken,
    events: Option<UnboundedSender<JobEvent>>,
    phase: JobPhase,
}

impl DownloadJob {
    pub fn new(
        url: impl Into<String>,
        dest: impl Into<PathBuf>,
        config: DownloadConfig,
        client: reqwest::Client,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            url: url.into(),
            dest: dest.into(),
            config,
            client,
            cancel: CancellationToken::new(),
            events: None,
            phase: JobPhase::Idle,
        })
    }

    /// Emits phase changes, the final plan and periodic progress
    /// snapshots on `events`.
    pub fn with_events(mut self, events: UnboundedSender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Cancelling this token stops all workers at a safe, resumable
    /// point; the job then returns [`DownloadError::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    fn set_phase(&mut self, phase: JobPhase) {
        self.phase = phase;
        info!(?phase, url = %self.url, "job phase");
        if let Some(tx) = &self.events {
            let _ = tx.send(JobEvent::Phase(phase));
        }
    }

    pub async fn run(mut self) -> Result<JobOutcome> {
        match self.execute().await {
            Ok(outcome) => {
                self.set_phase(JobPhase::Completed);
                Ok(outcome)
            }
            Err(e) => {
                self.set_phase(JobPhase::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<JobOutcome> {
        self.set_phase(JobPhase::Probing);
        let probe = probe_resource(&self.client, &self.url).await?;

        let store = ResumeStore::new(&self.url, &self.dest);
        let previous = match store.load(probe.total_size).await {
            Some(record)
                if record.url == self.url
                    && record.range_supported == probe.range_supported
                    && is_exact_partition(&record.segments, probe.total_size) =>
            {
                Some(record)
            }
            Some(_) => {
                // Partial reuse is out of scope: any mismatch discards the
                // whole record and planning starts fresh.
                let reason = DownloadError::ResumeRecordInvalid(
                    "segment boundaries or server capabilities changed".into(),
                );
                warn!(%reason, "discarding resume record");
                None
            }
            None => None,
        };

        self.set_phase(JobPhase::Planning);
        let (record, resumed) = match previous {
            Some(record) => {
                info!(
                    done = record.segments.iter().filter(|s| s.is_done()).count(),
                    total = record.segments.len(),
                    "resuming from saved record"
                );
                (record, true)
            }
            None => {
                let segments = plan_segments(&probe, &self.config);
                // Preallocate so positioned writes land in place. Only on
                // a fresh plan: recreating would zero resumed bytes.
                let file = tokio::fs::File::create(&self.dest).await?;
                if let Some(size) = probe.total_size {
                    file.set_len(size).await?;
                }
                let record = ResumeRecord {
                    key: store.key().to_string(),
                    url: self.url.clone(),
                    total_size: probe.total_size,
                    range_supported: probe.range_supported,
                    segments,
                };
                (record, false)
            }
        };

        let total_size = record.total_size;
        let segment_count = record.segments.len();
        let tracker = ProgressTracker::new(&record.segments, total_size);
        if let Some(tx) = &self.events {
            let _ = tx.send(JobEvent::Planned {
                total_size,
                segments: record.segments.clone(),
                resumed,
            });
        }

        let flush_threshold = match total_size {
            Some(total) => self
                .config
                .effective_chunk_size(total, segment_count as u64),
            None => self.config.chunk_size.unwrap_or(FALLBACK_FLUSH),
        };

        let state = Arc::new(Mutex::new(JobState::new(record, store)));
        state.lock().await.persist().await;

        self.set_phase(JobPhase::Downloading);
        let ctx = WorkerContext {
            url: self.url.clone(),
            dest: self.dest.clone(),
            range_supported: probe.range_supported,
            flush_threshold,
            max_retries: self.config.max_retries,
            retry_delay: self.config.retry_delay,
            tracker: tracker.clone(),
            state: state.clone(),
            client: self.client.clone(),
            cancel: self.cancel.clone(),
        };

        let pending: Vec<usize> = {
            let locked = state.lock().await;
            locked
                .record
                .segments
                .iter()
                .filter(|s| !s.is_done())
                .map(|s| s.index)
                .collect()
        };

        let sampler = self.spawn_sampler(tracker.clone());

        let tasks: Vec<_> = pending
            .into_iter()
            .map(|index| {
                let ctx = ctx.clone();
                tokio::spawn(download_segment(ctx, index))
            })
            .collect();
        let results = join_all(tasks).await;

        if let Some((stop, handle)) = sampler {
            stop.cancel();
            let _ = handle.await;
        }
        self.emit_progress(&tracker);

        let mut failures = Vec::new();
        let mut cancelled = false;
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(DownloadError::Cancelled)) => cancelled = true,
                Ok(Err(e)) => failures.push(e),
                Err(join_err) => failures.push(DownloadError::SegmentTransferFailed {
                    index: usize::MAX,
                    attempts: 0,
                    reason: format!("worker panicked: {join_err}"),
                }),
            }
        }

        if cancelled {
            // Workers checkpointed before stopping; the record on disk is
            // a valid resume point.
            return Err(DownloadError::Cancelled);
        }
        if !failures.is_empty() {
            for e in &failures {
                error!(error = %e, "segment permanently failed");
            }
            // Completed segments stay on disk and in the record; a retry
            // of the whole job re-attempts only the failed ones.
            return Err(failures.remove(0));
        }

        self.set_phase(JobPhase::Finalizing);
        if let Some(expected) = total_size {
            let actual = tokio::fs::metadata(&self.dest).await?.len();
            if actual != expected {
                // Record is retained for diagnosis; this is corruption,
                // not a network fault.
                return Err(DownloadError::IntegrityMismatch { expected, actual });
            }
        }
        state.lock().await.clear().await;

        Ok(JobOutcome {
            total_size,
            bytes_written: tracker.snapshot().downloaded,
            resumed,
        })
    }

    fn spawn_sampler(
        &self,
        tracker: Arc<ProgressTracker>,
    ) -> Option<(CancellationToken, tokio::task::JoinHandle<()>)> {
        let tx = self.events.clone()?;
        let stop = CancellationToken::new();
        let stop_signal = stop.clone();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(PROGRESS_INTERVAL);
            loop {
                tokio::select! {
                    _ = stop_signal.cancelled() => break,
                    _ = tick.tick() => {
                        if tx.send(JobEvent::Progress(tracker.snapshot())).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Some((stop, handle))
    }

    fn emit_progress(&self, tracker: &ProgressTracker) {
        if let Some(tx) = &self.events {
            let _ = tx.send(JobEvent::Progress(tracker.snapshot()));
        }
    }
}
