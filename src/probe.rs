//! Resource prober: a metadata-only HEAD request that discovers the total
//! content length and whether the server honors byte-range requests.
use crate::error::{DownloadError, Result};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH};
use tracing::debug;

/// What a probe learned about the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Total content length, or `None` for chunked responses with no
    /// advertised length.
    pub total_size: Option<u64>,
    /// Whether `Range:` requests are honored. Servers that ignore the
    /// header return the full body, so this must be checked up front.
    pub range_supported: bool,
}

/// Issues the probe. Fails fast with [`DownloadError::ProbeFailed`] when
/// the resource is unreachable or the server rejects the request; no
/// segment work is worth planning in that case.
pub async fn probe_resource(client: &reqwest::Client, url: &str) -> Result<Probe> {
    let response = client.head(url).send().await.map_err(|e| DownloadError::ProbeFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(DownloadError::ProbeFailed {
            url: url.to_string(),
            reason: format!("status code {}", response.status()),
        });
    }

    let headers = response.headers();
    let total_size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let range_supported = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("bytes"))
        .unwrap_or(false);

    debug!(?total_size, range_supported, url, "probe complete");

    Ok(Probe {
        total_size,
        range_supported,
    })
}
