//! Utility helpers used across the crate.
//!
//! Filename extraction, human readable byte counts, and post-download
//! SHA-256 verification.
use crate::error::{DownloadError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use percent_encoding::percent_decode_str;
use sanitize_filename::sanitize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use url::Url;

/// Destination name used when a URL carries no usable basename and the
/// user gave none.
pub const DEFAULT_FILENAME: &str = "output.bin";

/// Derives a destination filename from a URL: the last path segment,
/// URL-decoded and stripped of characters the OS rejects.
/// [`DEFAULT_FILENAME`] covers unparseable URLs and bare directories.
pub fn filename_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return DEFAULT_FILENAME.to_string();
    };
    let basename = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let name = sanitize(percent_decode_str(basename).decode_utf8_lossy());
    if name.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        name
    }
}

/// Formats a byte count for humans, e.g. `1.50 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} PB")
}

/// Hashes the file at `path` and compares against a hex-encoded SHA-256.
///
/// Blocking; run it on a blocking task from async contexts.
pub fn verify_file_integrity(path: &Path, expected_hash: &str) -> Result<()> {
    let mut file = std::fs::File::open(path)?;
    let file_size = file.metadata()?.len();

    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.yellow/blue}] {bytes}/{total_bytes} ({eta})")
            .expect("static template")
            .progress_chars("#>-"),
    );
    pb.set_message("Hashing");

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];
    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
        pb.inc(count as u64);
    }
    pb.finish_and_clear();

    let actual = hex::encode(hasher.finalize());
    if actual == expected_hash.to_lowercase() {
        Ok(())
    } else {
        Err(DownloadError::HashMismatch {
            expected: expected_hash.to_lowercase(),
            actual,
        })
    }
}
