//! Resource resolution.
//!
//! The engine only ever downloads direct, range-fetchable URLs. Anything
//! platform-specific (multi-step negotiation, manifest lookups, signed
//! URLs) lives behind [`ResourceResolver`]; the engine treats its output
//! as an opaque direct URL plus a filename hint.
use crate::error::{DownloadError, Result};
use crate::utils;

/// A resolved resource: something the engine can fetch directly.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub url: String,
    /// A suggested destination filename, when the resolver can tell.
    pub filename: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait ResourceResolver {
    async fn resolve(&self, url: &str) -> Result<Resolved>;
}

/// The identity resolver: the user-supplied URL already is direct; the
/// filename hint is the URL's last path segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

impl ResourceResolver for DirectResolver {
    async fn resolve(&self, url: &str) -> Result<Resolved> {
        let parsed = url::Url::parse(url).map_err(|e| DownloadError::ProbeFailed {
            url: url.to_string(),
            reason: format!("invalid URL: {e}"),
        })?;
        Ok(Resolved {
            url: parsed.to_string(),
            filename: Some(utils::filename_from_url(url)),
        })
    }
}
