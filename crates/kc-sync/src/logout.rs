//! Federated logout broadcast.
//!
//! On logout, every registered application endpoint is POSTed in parallel
//! so sessions die everywhere at once. The broadcast is best-effort: each
//! endpoint gets its own result, nothing is rolled back, and the only
//! deadline is the per-request timeout.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::SyncResult;
use crate::http::build_client;
use std::time::Duration;

/// Maximum in-flight logout requests.
const LOGOUT_CONCURRENCY: usize = 10;

/// Per-request timeout.
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of notifying one endpoint.
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    /// The endpoint that was notified.
    pub url: String,
    /// Whether the endpoint acknowledged with a success status.
    pub ok: bool,
    /// HTTP status, when a response came back at all.
    pub status: Option<u16>,
    /// Error message, when the request itself failed.
    pub error: Option<String>,
}

/// POST to every logout endpoint, at most [`LOGOUT_CONCURRENCY`] in flight.
///
/// Always returns one result per endpoint, in input order, regardless of
/// individual failures.
///
/// # Errors
///
/// Fails only if the HTTP client cannot be built.
pub async fn broadcast_logout(urls: &[String]) -> SyncResult<Vec<BroadcastResult>> {
    let http = build_client(LOGOUT_TIMEOUT)?;
    let semaphore = Arc::new(Semaphore::new(LOGOUT_CONCURRENCY));

    let requests = urls.iter().map(|url| {
        let http = http.clone();
        let semaphore = Arc::clone(&semaphore);
        let url = url.clone();
        async move {
            // a closed semaphore is impossible here; treat it as a failure
            // rather than unwrapping
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(error) => {
                    return BroadcastResult {
                        url,
                        ok: false,
                        status: None,
                        error: Some(error.to_string()),
                    }
                }
            };

            match http.post(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        info!(url, status = status.as_u16(), "logout endpoint notified");
                    } else {
                        warn!(url, status = status.as_u16(), "logout endpoint refused");
                    }
                    BroadcastResult {
                        url,
                        ok: status.is_success(),
                        status: Some(status.as_u16()),
                        error: None,
                    }
                }
                Err(error) => {
                    warn!(url, %error, "logout endpoint unreachable");
                    BroadcastResult {
                        url,
                        ok: false,
                        status: None,
                        error: Some(error.to_string()),
                    }
                }
            }
        }
    });

    Ok(join_all(requests).await)
}
