//! Document retrieval: turn the configured source into raw PDF bytes.
//!
//! The published document is a plain HTTP resource, but operators often keep
//! a downloaded copy around to re-run a scrape offline, so a source that is
//! not an HTTP(S) URL is read from the local filesystem instead. Any failure
//! here is fatal for the run: nothing has been processed yet.

use crate::error::ScrapeError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the source string looks like a URL.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetch the source document as raw bytes.
pub async fn fetch_document(
    source: &str,
    timeout_secs: u64,
    user_agent: &str,
) -> Result<Vec<u8>, ScrapeError> {
    if is_url(source) {
        download_url(source, timeout_secs, user_agent).await
    } else {
        read_local(source).await
    }
}

/// Read a local file, mapping I/O failures to fetch errors.
async fn read_local(path_str: &str) -> Result<Vec<u8>, ScrapeError> {
    let path = PathBuf::from(path_str);

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ScrapeError::PermissionDenied { path })
        }
        Err(_) => Err(ScrapeError::FileNotFound { path }),
    }
}

/// Download a URL into memory.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    user_agent: &str,
) -> Result<Vec<u8>, ScrapeError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .map_err(|e| ScrapeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| map_request_error(url, timeout_secs, e))?;

    if !response.status().is_success() {
        return Err(ScrapeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_request_error(url, timeout_secs, e))?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

fn map_request_error(url: &str, timeout_secs: u64, e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::DownloadTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
    } else {
        ScrapeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}
