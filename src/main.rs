//! Command-line frontend for the download engine.
//!
//! Parses arguments, resolves the URL, runs one download job and renders
//! its event stream as progress bars. Exit code is 0 only when the job
//! reaches `Completed`.
use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parget::args::Args;
use parget::config::DownloadConfig;
use parget::downloader::{DownloadJob, JobPhase};
use parget::error::DownloadError;
use parget::progress::JobEvent;
use parget::resolver::{DirectResolver, ResourceResolver};
use parget::utils;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Renders job events until the channel closes.
async fn render_events(mut rx: mpsc::UnboundedReceiver<JobEvent>) {
    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template(
        "{msg}: {percent:>3}% [{bar:40.cyan/blue}] {bytes}/{total_bytes}",
    )
    .expect("static template")
    .progress_chars("=>-");
    let open_style = ProgressStyle::with_template("{msg}: {bytes} {spinner}")
        .expect("static template");

    let mut bars: Vec<ProgressBar> = Vec::new();

    while let Some(event) = rx.recv().await {
        match event {
            JobEvent::Planned {
                total_size,
                segments,
                resumed,
            } => {
                let size_line = match total_size {
                    Some(size) => format!("Total size: {}", utils::human_size(size)),
                    None => "Total size: unknown".to_string(),
                };
                let _ = multi.println(size_line);
                if resumed {
                    let _ = multi.println("Resuming previous download");
                }

                let count = segments.len();
                for seg in &segments {
                    let pb = if seg.is_open_ended() {
                        let pb = multi.add(ProgressBar::new_spinner());
                        pb.set_style(open_style.clone());
                        pb
                    } else {
                        let pb = multi.add(ProgressBar::new(seg.len()));
                        pb.set_style(style.clone());
                        pb
                    };
                    pb.set_message(format!("Downloading part {}/{}", seg.index + 1, count));
                    let already = if seg.is_done() {
                        seg.len()
                    } else {
                        seg.bytes_written
                    };
                    pb.set_position(already);
                    bars.push(pb);
                }
            }
            JobEvent::Progress(snapshot) => {
                for seg in &snapshot.segments {
                    if let Some(pb) = bars.get(seg.index) {
                        pb.set_position(seg.bytes);
                    }
                }
            }
            JobEvent::Phase(JobPhase::Finalizing) => {
                for pb in &bars {
                    pb.finish();
                }
            }
            JobEvent::Phase(_) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let resolved = DirectResolver.resolve(&args.url).await?;
    let dest = args
        .filename
        .clone()
        .or(resolved.filename)
        .unwrap_or_else(|| utils::DEFAULT_FILENAME.to_string());
    let dest = PathBuf::from(dest);

    let config = DownloadConfig {
        splits: args.splits,
        chunk_size: args.chunk_size.map(|kb| kb * 1024),
        ..Default::default()
    };

    let client = reqwest::Client::builder()
        .user_agent(concat!("parget/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(args.connect_timeout))
        .build()?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping downloads at a resumable point...");
            signal_token.cancel();
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let render = tokio::spawn(render_events(rx));

    let job = DownloadJob::new(resolved.url, &dest, config, client)?
        .with_events(tx)
        .with_cancellation(cancel);
    let result = job.run().await;

    // The job dropped its sender; drain remaining events before printing.
    let _ = render.await;

    match result {
        Ok(_outcome) => {
            if let Some(expected_hash) = args.verify_sha256 {
                let path = dest.clone();
                tokio::task::spawn_blocking(move || {
                    utils::verify_file_integrity(&path, &expected_hash)
                })
                .await??;
                println!("Integrity check passed");
            }
            println!("Download Complete");
            Ok(())
        }
        Err(DownloadError::Cancelled) => {
            eprintln!("Download paused. Re-run the same command to resume.");
            Err(DownloadError::Cancelled.into())
        }
        Err(e) => Err(e.into()),
    }
}
