//! HTTP client shared foundation
//!
//! This module provides a shared HTTP client with:
//! - Configurable timeout and User-Agent
//! - Exponential backoff retry logic (max 3 retries)
//! - Rate limit error handling
//! - Streaming downloads to disk with progress reporting

use crate::domain::DownloadStatus;
use crate::error::FetchError;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

/// Default connect/read timeout for HTTP requests (30 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent header
const DEFAULT_USER_AGENT: &str = concat!("apkup/", env!("CARGO_PKG_VERSION"));

/// Maximum number of retry attempts
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BASE_DELAY_MS: u64 = 100;

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Create a new HTTP client with custom configuration
    ///
    /// The timeout bounds connecting and every read, not the whole
    /// transfer, so large artifacts can take as long as they need.
    pub fn with_config(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::request("", format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Perform a GET request with retry logic
    ///
    /// Connection failures, timeouts and HTTP 429 are retried with
    /// exponential backoff. Any other non-success status fails at once.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let mut last_error = None;
        let mut delay = BASE_DELAY_MS;

        for attempt in 0..=self.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(FetchError::RateLimited {
                            url: url.to_string(),
                        });
                    } else if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound {
                            url: url.to_string(),
                        });
                    } else if !status.is_success() {
                        return Err(FetchError::status(url, status.as_u16()));
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        FetchError::timeout(url)
                    } else {
                        FetchError::request(url, e.to_string())
                    });
                }
            }

            if attempt < self.max_retries {
                tracing::debug!(url, attempt, delay_ms = delay, "retrying request");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::request(url, "unknown error")))
    }

    /// Perform a GET request and return the body as text
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::invalid_body(url, format!("failed to read text: {}", e)))
    }

    /// Stream the body of `url` into `dest`
    ///
    /// Progress is published after every chunk. If the future fails or is
    /// dropped before completion, the partially written file is removed.
    pub async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        progress: &watch::Sender<DownloadStatus>,
    ) -> Result<u64, FetchError> {
        let mut response = self.get(url).await?;
        let total = response.content_length();

        let write_error = |source: std::io::Error| FetchError::Write {
            path: dest.to_path_buf(),
            source,
        };

        let guard = PartialFile::new(dest);
        let mut file = tokio::fs::File::create(dest).await.map_err(write_error)?;
        let mut bytes_read: u64 = 0;
        progress.send_replace(DownloadStatus::running(0, total));

        loop {
            let chunk = response.chunk().await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url)
                } else {
                    FetchError::request(url, e.to_string())
                }
            })?;
            let Some(chunk) = chunk else {
                break;
            };
            file.write_all(&chunk).await.map_err(write_error)?;
            bytes_read += chunk.len() as u64;
            progress.send_replace(DownloadStatus::running(bytes_read, total));
        }

        file.flush().await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;
        guard.keep();

        Ok(bytes_read)
    }
}

/// Removes a file on drop unless it was kept
///
/// Covers error returns, panics and cancellation of the owning future.
pub(crate) struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    /// Keep the file, it is complete
    pub(crate) fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), "failed to remove partial file: {}", e);
                }
            }
        }
    }
}
