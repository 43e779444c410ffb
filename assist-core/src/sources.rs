//! Validation of knowledge source URLs.
//!
//! Sources are checked before any ingestion starts so a bad entry fails
//! the whole load with a message that points at it.

use url::Url;

/// A configured source that cannot be ingested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("knowledge source #{index} ({url:?}) is invalid: {reason}")]
pub struct SourceError {
    /// Position in the configured list
    pub index: usize,
    /// Value as configured
    pub url: String,
    pub reason: String,
}

/// Parse a single source. Accepts absolute `http`/`https` URLs with a host.
pub fn validate_source(index: usize, raw: &str) -> Result<Url, SourceError> {
    let fail = |reason: &str| SourceError {
        index,
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(fail("source URL is empty"));
    }

    let url = Url::parse(trimmed).map_err(|err| fail(&format!("not a valid URL: {}", err)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(fail(&format!("unsupported scheme '{}'", other))),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(fail("URL has no host"));
    }
    Ok(url)
}

/// Validate every source, stopping at the first invalid one.
pub fn validate_sources<S: AsRef<str>>(sources: &[S]) -> Result<Vec<Url>, SourceError> {
    sources
        .iter()
        .enumerate()
        .map(|(index, raw)| validate_source(index, raw.as_ref()))
        .collect()
}
