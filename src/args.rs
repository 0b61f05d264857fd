use clap::Parser;

/// A parallel, resumable file downloader.
///
/// Splits the target into byte-range segments, downloads them
/// concurrently, and picks up interrupted downloads where they left off.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// URL of the file to download.
    pub url: String,

    /// Name of the file to save as. Derived from the URL when omitted.
    pub filename: Option<String>,

    /// Number of parallel segments. Sized from the file when omitted.
    #[arg(long)]
    pub splits: Option<u64>,

    /// Streaming chunk size in KB. Sized from the file when omitted.
    #[arg(long, value_name = "KB")]
    pub chunk_size: Option<u64>,

    /// An optional SHA-256 hash to verify file integrity after download.
    #[arg(long)]
    pub verify_sha256: Option<String>,

    /// Connection timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,
}
