//! Minimal library usage: download one file with progress printed as
//! plain lines instead of the binary's progress bars.
//!
//! Run with: cargo run --example simple_download
use parget::config::DownloadConfig;
use parget::downloader::DownloadJob;
use parget::progress::JobEvent;
use parget::resolver::{DirectResolver, ResourceResolver};
use parget::utils;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = "https://proof.ovh.net/files/10Mb.dat";
    println!("Starting download: {url}");

    let resolved = DirectResolver.resolve(url).await?;
    let dest = resolved
        .filename
        .unwrap_or_else(|| utils::DEFAULT_FILENAME.to_string());

    let client = reqwest::Client::builder()
        .user_agent("parget-demo/0.2")
        .connect_timeout(Duration::from_secs(30))
        .build()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                JobEvent::Planned {
                    total_size,
                    segments,
                    ..
                } => {
                    if let Some(size) = total_size {
                        println!(
                            "Total size: {}, {} segments",
                            utils::human_size(size),
                            segments.len()
                        );
                    }
                }
                JobEvent::Progress(snapshot) => {
                    if let Some(percent) = snapshot.percent() {
                        println!(
                            "{:.1}% ({})",
                            percent,
                            utils::human_size(snapshot.downloaded)
                        );
                    }
                }
                JobEvent::Phase(phase) => println!("phase: {phase:?}"),
            }
        }
    });

    let job = DownloadJob::new(resolved.url, &dest, DownloadConfig::default(), client)?
        .with_events(tx);
    let outcome = job.run().await?;
    let _ = printer.await;

    println!(
        "Done: {} written to {dest}",
        utils::human_size(outcome.bytes_written)
    );
    Ok(())
}
