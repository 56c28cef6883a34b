//! In-process cache backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::backend::CacheBackend;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// An in-process [`CacheBackend`] over a `RwLock<HashMap>`.
///
/// Expired entries are dropped lazily on access. Counters are stored as
/// ASCII decimal so a debugger (or a Redis-backed twin of this type) sees
/// the same representation.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn versioned(key: &str, version: &str) -> String {
        format!("{version}:{key}")
    }

    /// Number of live (unexpired) entries, for tests and stats.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    /// Whether the cache holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str, version: &str) -> Option<Vec<u8>> {
        let full_key = Self::versioned(key, version);
        let entries = self.entries.read().await;
        match entries.get(&full_key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration, version: &str) {
        let full_key = Self::versioned(key, version);
        let mut entries = self.entries.write().await;
        entries.insert(
            full_key,
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
    }

    async fn incr(&self, key: &str, ttl: Duration, version: &str) -> u64 {
        let full_key = Self::versioned(key, version);
        let mut entries = self.entries.write().await;

        let live = entries
            .get(&full_key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                (current, entry.expires_at)
            });

        match live {
            // keep the original expiry: the window is fixed, not sliding
            Some((current, expires_at)) => {
                let next = current + 1;
                entries.insert(
                    full_key,
                    Entry {
                        value: next.to_string().into_bytes(),
                        expires_at,
                    },
                );
                next
            }
            None => {
                entries.insert(
                    full_key,
                    Entry {
                        value: b"1".to_vec(),
                        expires_at: Instant::now().checked_add(ttl),
                    },
                );
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache.set("k", b"payload", Duration::from_secs(60), "1.0").await;
        assert_eq!(cache.get("k", "1.0").await, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = InMemoryCache::new();
        cache.set("k", b"v", Duration::from_millis(10), "1.0").await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get("k", "1.0").await, None);
    }

    #[tokio::test]
    async fn versions_are_isolated() {
        let cache = InMemoryCache::new();
        cache.set("k", b"old", Duration::from_secs(60), "1.0").await;
        assert_eq!(cache.get("k", "2.0").await, None);
    }

    #[tokio::test]
    async fn incr_counts_up_from_one() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("calls", Duration::from_secs(60), "1.0").await, 1);
        assert_eq!(cache.incr("calls", Duration::from_secs(60), "1.0").await, 2);
        assert_eq!(cache.incr("calls", Duration::from_secs(60), "1.0").await, 3);
    }

    #[tokio::test]
    async fn incr_resets_after_window_expires() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("calls", Duration::from_millis(10), "1.0").await, 1);
        assert_eq!(cache.incr("calls", Duration::from_millis(10), "1.0").await, 2);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.incr("calls", Duration::from_millis(10), "1.0").await, 1);
    }

    #[tokio::test]
    async fn incr_does_not_slide_the_window() {
        let cache = InMemoryCache::new();
        cache.incr("calls", Duration::from_millis(40), "1.0").await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        // this increment must not extend the original expiry
        cache.incr("calls", Duration::from_millis(40), "1.0").await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.incr("calls", Duration::from_millis(40), "1.0").await, 1);
    }
}
