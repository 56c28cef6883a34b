//! Cache backend abstraction.

use async_trait::async_trait;
use std::time::Duration;

/// A key/value store with TTL, a version tag and an atomic increment.
///
/// The version tag namespaces every key: bumping the version (which happens
/// naturally on each release) invalidates all previously written entries
/// without explicit eviction.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the value stored under `key` at `version`, if present and
    /// unexpired.
    async fn get(&self, key: &str, version: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key` at `version` with the given TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration, version: &str);

    /// Atomically increment the counter stored under `key` and return the
    /// new count.
    ///
    /// A missing or expired counter is created at 1 with the given TTL; an
    /// existing counter keeps its original expiry, so the window is fixed
    /// rather than sliding.
    async fn incr(&self, key: &str, ttl: Duration, version: &str) -> u64;
}
