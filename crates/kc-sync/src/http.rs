//! Shared HTTP plumbing: pooled client construction and retry with
//! exponential backoff.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Per-call timeout applied to every outbound membership API request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection pool size per upstream host.
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Build a pooled HTTP client with the given per-call timeout.
///
/// TLS verification is always on.
///
/// # Errors
///
/// Returns [`SyncError::ClientBuild`] if the underlying client cannot be
/// constructed.
pub fn build_client(timeout: Duration) -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .user_agent(concat!("kc-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::ClientBuild(e.to_string()))
}

/// Retry policy for upstream calls.
///
/// Retries transient failures (network errors, timeouts and the statuses in
/// `retry_statuses`) up to `max_retries` times with exponential backoff:
/// `base_delay * 2^attempt`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// HTTP statuses that warrant a retry.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// Policy used for webhook deliveries, which additionally retries
    /// request-timeout and too-many-requests statuses.
    #[must_use]
    pub fn for_webhooks() -> Self {
        Self {
            retry_statuses: vec![408, 429, 500, 502, 503, 504],
            ..Self::default()
        }
    }

    /// Whether the error should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &SyncError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match error {
            SyncError::Status { status } => self.retry_statuses.contains(status),
            SyncError::Network { .. } | SyncError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Backoff delay before the given retry attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Execute an async operation with retry.
    ///
    /// The closure is called until it succeeds, fails with a non-retryable
    /// error, or exhausts the retry budget.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = SyncResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.should_retry(attempt, &error) {
                        if attempt > 0 {
                            warn!(
                                operation,
                                attempts = attempt + 1,
                                error = %error,
                                "giving up after retries"
                            );
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
