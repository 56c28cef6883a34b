//! Read-through cache for upstream response bodies.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

use crate::backend::CacheBackend;

static MAX_AGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"max-age=(\d+)").expect("MAX_AGE_RE is a valid regex pattern"));

/// Keyed storage for raw upstream response bodies.
///
/// Only successful responses are ever stored; the TTL is the upstream
/// `Cache-Control` max-age when present, capped by the configured ceiling.
/// Every entry carries the global version tag, so a redeploy invalidates the
/// lot.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    ceiling: Duration,
    version: String,
}

impl ResponseCache {
    /// Create a response cache over `backend` with the given TTL ceiling and
    /// version tag.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, ceiling: Duration, version: impl Into<String>) -> Self {
        Self {
            backend,
            ceiling,
            version: version.into(),
        }
    }

    /// Fetch a previously stored body, if present and unexpired.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let hit = self.backend.get(key, &self.version).await;
        if hit.is_some() {
            debug!(key, "response cache hit");
        }
        hit
    }

    /// Store a successful response body.
    ///
    /// `cache_control` is the raw `Cache-Control` header value, if the
    /// upstream sent one.
    pub async fn store(&self, key: &str, body: &[u8], cache_control: Option<&str>) {
        let ttl = self.ttl_for(cache_control);
        self.backend.set(key, body, ttl, &self.version).await;
    }

    fn ttl_for(&self, cache_control: Option<&str>) -> Duration {
        let Some(header) = cache_control else {
            return self.ceiling;
        };
        match MAX_AGE_RE
            .captures(header)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        {
            Some(max_age) => Duration::from_secs(max_age).min(self.ceiling),
            None => self.ceiling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCache;

    fn cache_with_ceiling(secs: u64) -> ResponseCache {
        ResponseCache::new(Arc::new(InMemoryCache::new()), Duration::from_secs(secs), "1.0")
    }

    #[test]
    fn max_age_below_ceiling_wins() {
        let cache = cache_with_ceiling(3600);
        assert_eq!(
            cache.ttl_for(Some("public, max-age=120")),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn ceiling_caps_large_max_age() {
        let cache = cache_with_ceiling(300);
        assert_eq!(
            cache.ttl_for(Some("max-age=86400")),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn missing_or_malformed_header_uses_ceiling() {
        let cache = cache_with_ceiling(300);
        assert_eq!(cache.ttl_for(None), Duration::from_secs(300));
        assert_eq!(cache.ttl_for(Some("no-store")), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn stored_body_comes_back_unchanged() {
        let cache = cache_with_ceiling(60);
        cache.store("mla_search_a@b.com", br#"{"meta":{}}"#, None).await;
        assert_eq!(
            cache.get("mla_search_a@b.com").await,
            Some(br#"{"meta":{}}"#.to_vec())
        );
    }
}
