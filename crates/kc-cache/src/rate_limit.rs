//! Fixed-window rate limiting.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::backend::CacheBackend;

/// Default call budget per window.
pub const DEFAULT_MAX_CALLS: u64 = 100;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Raised when a call budget is exhausted for the current window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {key}: {max_calls} calls per {window_secs}s")]
pub struct RateLimitExceeded {
    /// The call-site key whose budget ran out.
    pub key: String,
    /// The configured budget.
    pub max_calls: u64,
    /// The window length in seconds.
    pub window_secs: u64,
}

/// A fixed-window call counter shared through the cache backend.
///
/// The counter key is created with a TTL equal to the window on first use
/// and the whole budget resets when it expires; bursts across a window
/// boundary are therefore possible. Every attempt increments the counter,
/// including attempts that are then rejected.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    backend: Arc<dyn CacheBackend>,
    max_calls: u64,
    window: Duration,
    version: String,
}

impl FixedWindowLimiter {
    /// Create a limiter with the given budget and window.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        max_calls: u64,
        window: Duration,
        version: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            max_calls,
            window,
            version: version.into(),
        }
    }

    /// Create a limiter with the default 100 calls / 60 s budget.
    #[must_use]
    pub fn with_defaults(backend: Arc<dyn CacheBackend>, version: impl Into<String>) -> Self {
        Self::new(backend, DEFAULT_MAX_CALLS, DEFAULT_WINDOW, version)
    }

    /// Spend one call from the budget for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the budget for the current window
    /// is already spent. The rejected attempt still counts toward the
    /// window's total.
    pub async fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        let count = self
            .backend
            .incr(&format!("rate_limit_{key}"), self.window, &self.version)
            .await;

        if count > self.max_calls {
            warn!(key, count, max_calls = self.max_calls, "rate limit exceeded");
            return Err(RateLimitExceeded {
                key: key.to_string(),
                max_calls: self.max_calls,
                window_secs: self.window.as_secs(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCache;

    fn limiter(max_calls: u64, window: Duration) -> FixedWindowLimiter {
        FixedWindowLimiter::new(Arc::new(InMemoryCache::new()), max_calls, window, "1.0")
    }

    #[tokio::test]
    async fn budget_is_exact() {
        let limiter = limiter(100, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.check("arlisna_request").await.is_ok());
        }
        let err = limiter.check("arlisna_request").await.unwrap_err();
        assert_eq!(err.max_calls, 100);
    }

    #[tokio::test]
    async fn budget_resets_when_window_elapses() {
        let limiter = limiter(2, Duration::from_millis(20));
        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_err());

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(limiter.check("k").await.is_ok());
    }

    #[tokio::test]
    async fn keys_have_independent_budgets() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("b").await.is_ok());
        assert!(limiter.check("a").await.is_err());
    }
}
