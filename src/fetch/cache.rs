//! Short-lived response cache keyed by URL

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Default freshness window of cached responses
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

struct CachedResponse {
    body: String,
    fetched_at: Instant,
}

/// In-memory text cache with a fixed freshness window
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached body for `url` if it is still fresh
    pub fn get(&self, url: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(url)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.body.clone())
    }

    pub fn insert(&self, url: &str, body: String) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            url.to_string(),
            CachedResponse {
                body,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every entry that is no longer fresh
    pub fn evict_stale(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_returned() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("https://example.org", "body".to_string());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("https://example.org").as_deref(), Some("body"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_is_ignored() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("https://example.org", "body".to_string());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("https://example.org").is_none());

        cache.evict_stale();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unknown_url() {
        let cache = ResponseCache::default();
        assert!(cache.get("https://example.org").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_refreshes_entry() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("u", "old".to_string());
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.insert("u", "new".to_string());
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.get("u").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }
}
