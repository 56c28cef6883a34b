//! Outbound notifications to downstream services.
//!
//! Two flavors:
//!
//! - [`WebhookNotifier`] - the best-effort `{token, username}` ping sent to
//!   every configured URL after a profile sync;
//! - [`IdmsClient`] - typed `{idp, updates}` user/group update payloads
//!   delivered to the identity-management webhook endpoint with retry.
//!
//! Neither ever propagates a delivery failure to the caller.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{SyncError, SyncResult};
use crate::http::{build_client, RetryPolicy};

/// Timeout for the post-sync ping.
const PING_TIMEOUT: Duration = Duration::from_secs(8);

/// Timeout for IDMS update deliveries.
const IDMS_TIMEOUT: Duration = Duration::from_secs(30);

const USER_DATA_UPDATE_ENDPOINT: &str = "/api/webhooks/user_data_update";

// --- Post-sync ping --------------------------------------------------------

/// Fire-and-forget ping to the services that mirror profile data.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier with its own short-timeout client.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new() -> SyncResult<Self> {
        Ok(Self {
            http: build_client(PING_TIMEOUT)?,
        })
    }

    /// POST `{token, username}` to every URL. Failures are logged and
    /// swallowed; they never fail the surrounding sync.
    pub async fn ping(&self, urls: &[String], token: &str, username: &str) {
        for url in urls {
            let result = self
                .http
                .post(url)
                .json(&json!({ "token": token, "username": username }))
                .send()
                .await;
            match result {
                Ok(_) => info!(url, username, "webhook update sent"),
                Err(error) => {
                    error!(%error, url, username, "failed to send webhook");
                }
            }
        }
    }
}

// --- IDMS updates ----------------------------------------------------------

/// Event type attached to a user or group update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
    Associated,
}

/// One user update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub id: String,
    pub event: EventType,
}

/// One group update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub id: String,
    pub event: EventType,
}

/// The `updates` object of an update payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Updates {
    #[serde(default)]
    pub users: Vec<UserUpdate>,
    #[serde(default)]
    pub groups: Vec<GroupUpdate>,
}

/// The complete update payload: `{idp, updates: {users, groups}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub idp: String,
    pub updates: Updates,
}

impl UpdatePayload {
    /// Build a validated payload.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::InvalidInput`] when the identity provider is
    /// blank, any update carries a blank ID, or there are no updates at
    /// all.
    pub fn new(
        idp: impl Into<String>,
        users: Vec<UserUpdate>,
        groups: Vec<GroupUpdate>,
    ) -> SyncResult<Self> {
        let idp = idp.into();
        if idp.trim().is_empty() {
            return Err(SyncError::invalid_input("IDP cannot be empty"));
        }
        if users.is_empty() && groups.is_empty() {
            return Err(SyncError::invalid_input(
                "at least one user or group update is required",
            ));
        }
        if users.iter().any(|u| u.id.trim().is_empty())
            || groups.iter().any(|g| g.id.trim().is_empty())
        {
            return Err(SyncError::invalid_input("update IDs cannot be empty"));
        }
        Ok(Self {
            idp,
            updates: Updates { users, groups },
        })
    }
}

/// Client for the identity-management system's webhook endpoint.
pub struct IdmsClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    base_url: String,
    token: String,
}

impl IdmsClient {
    /// Create a client for `base_url`, authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::InvalidInput`] on a missing token and
    /// [`SyncError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> SyncResult<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(SyncError::invalid_input("missing webhook token"));
        }
        Ok(Self {
            http: build_client(IDMS_TIMEOUT)?,
            retry: RetryPolicy::for_webhooks(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Deliver an update payload, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint stays unreachable or rejects the payload
    /// after retries.
    pub async fn send_updates(&self, payload: &UpdatePayload) -> SyncResult<serde_json::Value> {
        let url = format!("{}{}", self.base_url, USER_DATA_UPDATE_ENDPOINT);
        let timeout_secs = IDMS_TIMEOUT.as_secs();

        self.retry
            .execute("idms_user_data_update", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = self.token.clone();
                async move {
                    let response = http
                        .post(&url)
                        .header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
                        .json(payload)
                        .send()
                        .await
                        .map_err(|e| SyncError::from_http(e, timeout_secs))?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(SyncError::Status {
                            status: status.as_u16(),
                        });
                    }
                    response
                        .json()
                        .await
                        .map_err(|e| SyncError::from_http(e, timeout_secs))
                }
            })
            .await
    }

    /// Best-effort wrapper around [`send_updates`](Self::send_updates):
    /// logs any failure and returns `None` instead of propagating it.
    pub async fn post_user_data_update(
        &self,
        users: Vec<UserUpdate>,
        groups: Vec<GroupUpdate>,
    ) -> Option<serde_json::Value> {
        let payload = match UpdatePayload::new("cilogon", users, groups) {
            Ok(payload) => payload,
            Err(error) => {
                error!(%error, "refusing to send invalid update payload");
                return None;
            }
        };
        match self.send_updates(&payload).await {
            Ok(response) => {
                info!(response = %response, "user data update delivered");
                Some(response)
            }
            Err(error) => {
                error!(%error, "failed to deliver user data update");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_requires_some_update() {
        let err = UpdatePayload::new("cilogon", vec![], vec![]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput { .. }));
    }

    #[test]
    fn payload_rejects_blank_ids() {
        let users = vec![UserUpdate {
            id: "  ".to_string(),
            event: EventType::Updated,
        }];
        assert!(UpdatePayload::new("cilogon", users, vec![]).is_err());
    }

    #[test]
    fn payload_serializes_to_wire_shape() {
        let payload = UpdatePayload::new(
            "cilogon",
            vec![UserUpdate {
                id: "myusername".to_string(),
                event: EventType::Updated,
            }],
            vec![GroupUpdate {
                id: "1234".to_string(),
                event: EventType::Updated,
            }],
        )
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "idp": "cilogon",
                "updates": {
                    "users": [{"id": "myusername", "event": "updated"}],
                    "groups": [{"id": "1234", "event": "updated"}]
                }
            })
        );
    }

    #[test]
    fn idms_client_requires_token() {
        assert!(IdmsClient::new("https://idms.example", "").is_err());
    }
}
