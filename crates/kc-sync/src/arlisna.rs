//! ARLISNA membership API client.
//!
//! The ARLISNA directory is searched by email and keyed by email: the
//! "member ID" this client resolves is the member's address, and ID lookups
//! re-query the search endpoint. Payloads routinely carry empty strings
//! where other APIs would send null, so bodies are scrubbed before
//! deserialization.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use kc_cache::{CacheBackend, FixedWindowLimiter, ResponseCache};
use kc_core::{validate_email, SyncSystem, RELEASE_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::ArlisnaConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{build_client, RetryPolicy, REQUEST_TIMEOUT};
use crate::traits::{MemberPayload, SearchHit, SearchOutcome, SyncApi};

const MEMBERS_URL: &str = "members";

// --- Response models -------------------------------------------------------

/// Postal address block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub state_province: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Member type descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MemberTypeInfo {
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub for_companies: bool,
}

/// Group membership entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupMembership {
    #[serde(rename = "GroupUniqueID")]
    pub group_unique_id: String,
    pub group_name: String,
    #[serde(default)]
    pub inheriting_member: bool,
    #[serde(default)]
    pub join_date: Option<String>,
}

/// One member record. The upstream schema is far wider; only the fields the
/// sync pipeline reads (plus enough identity to debug with) are modeled,
/// and unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MemberResult {
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub member_status: Option<String>,
    #[serde(default)]
    pub member_sub_status: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub account_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub original_join_date: Option<String>,
    #[serde(default)]
    pub member_since: Option<String>,
    #[serde(default)]
    pub membership_expires: Option<String>,
    #[serde(default)]
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub member_type: Option<MemberTypeInfo>,
    #[serde(default)]
    pub groups: Vec<GroupMembership>,
}

/// Envelope of a member search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MembersSearchResponse {
    pub total_count: u32,
    #[serde(default)]
    pub results: Vec<MemberResult>,
}

impl MembersSearchResponse {
    /// Deserialize a response body, normalizing empty strings to null
    /// first.
    ///
    /// # Errors
    ///
    /// Fails when the scrubbed body does not match the schema.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_slice(body)?;
        scrub_empty_strings(&mut value);
        serde_json::from_value(value)
    }
}

/// Recursively replace empty strings with null so optional fields
/// deserialize as `None` rather than `Some("")`.
fn scrub_empty_strings(value: &mut Value) {
    match value {
        Value::String(s) if s.is_empty() => *value = Value::Null,
        Value::Array(items) => {
            for item in items {
                scrub_empty_strings(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                scrub_empty_strings(item);
            }
        }
        _ => {}
    }
}

// --- Client ----------------------------------------------------------------

/// Client for the ARLISNA membership API.
pub struct ArlisnaClient {
    config: ArlisnaConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
    limiter: FixedWindowLimiter,
    cache: ResponseCache,
}

impl ArlisnaClient {
    /// Create a client over the given cache backend.
    ///
    /// # Errors
    ///
    /// Fails if the pooled HTTP client cannot be built.
    pub fn new(config: ArlisnaConfig, backend: Arc<dyn CacheBackend>) -> SyncResult<Self> {
        let cache = ResponseCache::new(
            Arc::clone(&backend),
            Duration::from_secs(config.cache_ttl_secs),
            RELEASE_VERSION,
        );
        Ok(Self {
            http: build_client(REQUEST_TIMEOUT)?,
            retry: RetryPolicy::default(),
            limiter: FixedWindowLimiter::with_defaults(backend, RELEASE_VERSION),
            cache,
            config,
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(
        &self,
        suffix: &str,
        params: &[(&str, &str)],
    ) -> SyncResult<(Vec<u8>, Option<String>)> {
        self.limiter.check("arlisna_request").await?;

        let url = format!("{}{}", self.config.base_url, suffix);
        let timeout_secs = REQUEST_TIMEOUT.as_secs();

        self.retry
            .execute("arlisna_request", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = self.config.api_token.clone();
                async move {
                    let response = http
                        .get(&url)
                        .query(params)
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .header(reqwest::header::AUTHORIZATION, format!("Basic {token}"))
                        .send()
                        .await
                        .map_err(|e| SyncError::from_http(e, timeout_secs))?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(SyncError::Status {
                            status: status.as_u16(),
                        });
                    }

                    let cache_control = response
                        .headers()
                        .get(reqwest::header::CACHE_CONTROL)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| SyncError::from_http(e, timeout_secs))?;
                    Ok((body.to_vec(), cache_control))
                }
            })
            .await
    }

    /// Cached query against the members resource.
    async fn query(
        &self,
        cache_key: &str,
        params: &[(&str, &str)],
    ) -> SyncResult<MembersSearchResponse> {
        if let Some(body) = self.cache.get(cache_key).await {
            return MembersSearchResponse::from_slice(&body)
                .map_err(|e| SyncError::parse(SyncSystem::Arlisna, e.to_string()));
        }

        let (body, cache_control) = self.request(MEMBERS_URL, params).await?;
        let response = MembersSearchResponse::from_slice(&body)
            .map_err(|e| SyncError::parse(SyncSystem::Arlisna, e.to_string()))?;
        self.cache
            .store(cache_key, &body, cache_control.as_deref())
            .await;
        Ok(response)
    }
}

/// Parse an ARLISNA expiry timestamp, assuming UTC when the payload omits
/// an offset.
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[async_trait]
impl SyncApi for ArlisnaClient {
    fn system(&self) -> SyncSystem {
        SyncSystem::Arlisna
    }

    async fn search(&self, email: &str) -> SyncResult<SearchOutcome> {
        validate_email(email)?;

        let cache_key = format!("ARLISNA_api_search_{email}");
        let response = match self.query(&cache_key, &[("email", email)]).await {
            Ok(response) => response,
            Err(error @ SyncError::RateLimited(_)) => return Err(error),
            Err(error) => {
                error!(%error, "request to ARLISNA API failed");
                return Ok(SearchOutcome::NotFound);
            }
        };

        if response.total_count > 0 {
            Ok(SearchOutcome::Found(SearchHit::Arlisna(response)))
        } else {
            Ok(SearchOutcome::NotFound)
        }
    }

    fn sync_id(&self, outcome: &SearchOutcome) -> Option<String> {
        match outcome {
            SearchOutcome::Found(SearchHit::Arlisna(response)) => response
                .results
                .first()
                .and_then(|result| result.email.clone()),
            _ => None,
        }
    }

    async fn get_user_info(&self, sync_id: &str) -> SyncResult<MemberPayload> {
        let cache_key = format!("ARLISNA_api_user_info_{sync_id}");
        let response = self.query(&cache_key, &[("email", sync_id)]).await?;
        Ok(MemberPayload::Arlisna(Box::new(response)))
    }

    async fn is_member(&self, sync_id: &str) -> bool {
        let response = match self.get_user_info(sync_id).await {
            Ok(MemberPayload::Arlisna(response)) => response,
            Ok(_) => return false,
            Err(error) => {
                error!(%error, sync_id, "ARLISNA member lookup failed");
                return false;
            }
        };

        if response.total_count == 0 {
            return false;
        }
        let Some(raw) = response
            .results
            .first()
            .and_then(|r| r.membership_expires.as_deref())
        else {
            return false;
        };

        match parse_expiry(raw) {
            Some(expiring_date) => expiring_date > Utc::now(),
            None => {
                warn!(raw, "error parsing date in ARLISNA response");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_become_none() {
        let body = br#"{"TotalCount":1,"Results":[{"UniqueID":"m-1","Email":"","Name":"A"}]}"#;
        let response = MembersSearchResponse::from_slice(body).unwrap();
        assert_eq!(response.results[0].email, None);
        assert_eq!(response.results[0].name.as_deref(), Some("A"));
    }

    #[test]
    fn nested_empty_strings_are_scrubbed() {
        let body = br#"{"TotalCount":1,"Results":[{"UniqueID":"m-1","BillingAddress":{"City":"","Country":"US"}}]}"#;
        let response = MembersSearchResponse::from_slice(body).unwrap();
        let address = response.results[0].billing_address.as_ref().unwrap();
        assert_eq!(address.city, None);
        assert_eq!(address.country.as_deref(), Some("US"));
    }

    #[test]
    fn expiry_parses_with_and_without_offset() {
        assert!(parse_expiry("2099-06-01T00:00:00+00:00").is_some());
        assert!(parse_expiry("2099-06-01T00:00:00").is_some());
        assert!(parse_expiry("2099-06-01").is_some());
        assert!(parse_expiry("June 2099").is_none());
    }
}
