//! Network access for resolvers and the download pipeline
//!
//! This module provides:
//! - HTTP client with retry and backoff
//! - URL keyed response cache with a freshness window
//! - The `Fetcher` seam used by resolvers and the pipeline

mod cache;
mod client;

pub use cache::{ResponseCache, DEFAULT_CACHE_TTL};
pub use client::HttpClient;
pub(crate) use client::PartialFile;

use crate::domain::DownloadStatus;
use crate::error::FetchError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Whether a cached response may answer a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Reuse a fresh cached response for the same URL
    #[default]
    UseCache,
    /// Always hit the network and refresh the cache
    ForceRefresh,
}

/// Trait for network access
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` as text
    async fn fetch_text(&self, url: &str, mode: CacheMode) -> Result<String, FetchError>;

    /// Stream `url` into `dest`, publishing progress; returns the byte count
    ///
    /// On failure or cancellation nothing is left at `dest`.
    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress: &watch::Sender<DownloadStatus>,
    ) -> Result<u64, FetchError>;
}

/// Fetch `url` and deserialize the JSON body
pub async fn fetch_json<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    url: &str,
    mode: CacheMode,
) -> Result<T, FetchError> {
    let body = fetcher.fetch_text(url, mode).await?;
    serde_json::from_str(&body)
        .map_err(|e| FetchError::invalid_body(url, format!("failed to parse JSON: {}", e)))
}

/// HTTP fetcher with a response cache in front of text requests
///
/// Requests for the same URL run one at a time, so concurrent resolvers
/// sharing a source wait for the first response instead of refetching it.
pub struct CachedFetcher {
    client: HttpClient,
    cache: ResponseCache,
    url_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CachedFetcher {
    pub fn new(client: HttpClient, ttl: Duration) -> Self {
        Self {
            client,
            cache: ResponseCache::new(ttl),
            url_locks: Mutex::new(HashMap::new()),
        }
    }

    fn url_lock(&self, url: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.url_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(url.to_string()).or_default())
    }
}

#[async_trait]
impl Fetcher for CachedFetcher {
    async fn fetch_text(&self, url: &str, mode: CacheMode) -> Result<String, FetchError> {
        let lock = self.url_lock(url);
        let _serialized = lock.lock().await;

        if mode == CacheMode::UseCache {
            if let Some(body) = self.cache.get(url) {
                tracing::debug!(url, "using cached response");
                return Ok(body);
            }
        }

        let body = self.client.get_text(url).await?;
        self.cache.evict_stale();
        self.cache.insert(url, body.clone());
        Ok(body)
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress: &watch::Sender<DownloadStatus>,
    ) -> Result<u64, FetchError> {
        self.client.download_to(url, dest, progress).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{http_response, FakeFetcher, TestServer};
    use super::*;
    use serde::Deserialize;

    fn cached_fetcher() -> CachedFetcher {
        let client = HttpClient::with_config(Duration::from_secs(5), "test")
            .unwrap()
            .with_max_retries(0);
        CachedFetcher::new(client, Duration::from_secs(60))
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        name: String,
    }

    #[tokio::test]
    async fn test_fetch_json() {
        let fetcher = FakeFetcher::new().with_text("u", r#"{"name":"klar"}"#);
        let payload: Payload = fetch_json(&fetcher, "u", CacheMode::UseCache)
            .await
            .unwrap();
        assert_eq!(payload.name, "klar");
    }

    #[tokio::test]
    async fn test_fetch_json_invalid_body() {
        let fetcher = FakeFetcher::new().with_text("u", "<html>");
        let err = fetch_json::<Payload>(&fetcher, "u", CacheMode::UseCache)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidBody { .. }));
    }

    #[tokio::test]
    async fn test_use_cache_reuses_response() {
        let server = TestServer::start(http_response("200 OK", b"listing")).await;
        let fetcher = cached_fetcher();

        let first = fetcher.fetch_text(&server.url, CacheMode::UseCache).await.unwrap();
        let second = fetcher.fetch_text(&server.url, CacheMode::UseCache).await.unwrap();

        assert_eq!(first, "listing");
        assert_eq!(second, "listing");
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_hits_network() {
        let server = TestServer::start(http_response("200 OK", b"listing")).await;
        let fetcher = cached_fetcher();

        fetcher.fetch_text(&server.url, CacheMode::UseCache).await.unwrap();
        fetcher.fetch_text(&server.url, CacheMode::ForceRefresh).await.unwrap();
        assert_eq!(server.hits(), 2);

        // The refreshed response answers later cached requests
        fetcher.fetch_text(&server.url, CacheMode::UseCache).await.unwrap();
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let server = TestServer::start(http_response("200 OK", b"{}")).await;
        let fetcher = cached_fetcher();

        let (a, b) = tokio::join!(
            fetcher.fetch_text(&server.url, CacheMode::UseCache),
            fetcher.fetch_text(&server.url, CacheMode::UseCache)
        );

        assert_eq!(a.unwrap(), "{}");
        assert_eq!(b.unwrap(), "{}");
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_failed_response_not_cached() {
        let server = TestServer::start(http_response("503 Service Unavailable", b"")).await;
        let fetcher = cached_fetcher();

        for _ in 0..2 {
            let err = fetcher
                .fetch_text(&server.url, CacheMode::UseCache)
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::Status { status: 503, .. }));
        }
        assert_eq!(server.hits(), 2);
    }

    #[test]
    fn test_cache_mode_default() {
        assert_eq!(CacheMode::default(), CacheMode::UseCache);
    }
}
