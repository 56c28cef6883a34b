//! UP (Association of University Presses) membership client, backed by
//! Salesforce.
//!
//! Contacts are searched with a SOQL query by email; the resolved member ID
//! is the contact's Account Id, and membership means that Account exists.
//! The bearer token is refreshed through an OAuth2 refresh-token grant
//! before every outbound call, which mirrors the historical integration
//! (see DESIGN.md for the recorded inefficiency).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kc_cache::{CacheBackend, FixedWindowLimiter, ResponseCache};
use kc_core::{validate_email, SyncSystem, RELEASE_VERSION};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::config::UpConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{build_client, RetryPolicy, REQUEST_TIMEOUT};
use crate::traits::{MemberPayload, SearchHit, SearchOutcome, SyncApi};

const QUERY_URL: &str = "query";

/// Offset position of the sign character in a `+HHMM`-style suffix.
const OFFSET_LEN: usize = 5;

// --- Datetime normalization ------------------------------------------------

/// Parse a Salesforce datetime such as `2025-11-06T13:56:42.000+0000`.
///
/// Salesforce emits RFC 3339-ish values whose offset lacks the colon
/// (`+0000` rather than `+00:00`); the colon is inserted before parsing.
/// A bare trailing `Z` is accepted as UTC.
pub fn parse_sf_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let mut value = raw.to_string();
    let bytes = value.as_bytes();
    if bytes.len() >= OFFSET_LEN
        && matches!(bytes[bytes.len() - OFFSET_LEN], b'+' | b'-')
        && bytes[bytes.len() - 3] != b':'
    {
        value.insert(value.len() - 2, ':');
    }
    let value = value.replace('Z', "+00:00");

    DateTime::parse_from_rfc3339(&value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn sf_datetime_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_sf_datetime(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unparsable Salesforce datetime: {s}"))),
    }
}

// --- Response models -------------------------------------------------------

/// Record metadata present on every sObject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfAttributes {
    #[serde(rename = "type")]
    pub kind: String,
    /// Usually a relative URL, so kept as a plain string.
    pub url: String,
}

/// Compound address field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfAddress {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A Salesforce Contact record, as returned by the SOQL search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub attributes: Option<SfAttributes>,
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Email", default)]
    pub email: Option<String>,
    #[serde(rename = "AccountId", default)]
    pub account_id: Option<String>,
    #[serde(rename = "Current_Staff__c", default)]
    pub current_staff: Option<bool>,
}

/// A Salesforce Account record. Typed for the standard and org-specific
/// fields the sync pipeline consumes; everything else is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub attributes: Option<SfAttributes>,
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "IsDeleted", default)]
    pub is_deleted: bool,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    #[serde(rename = "AccountNumber", default)]
    pub account_number: Option<String>,
    #[serde(rename = "Phone", default)]
    pub phone: Option<String>,
    #[serde(rename = "Website", default)]
    pub website: Option<String>,
    #[serde(rename = "Industry", default)]
    pub industry: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "BillingAddress", default)]
    pub billing_address: Option<SfAddress>,
    #[serde(rename = "ShippingAddress", default)]
    pub shipping_address: Option<SfAddress>,
    #[serde(rename = "CreatedDate", default, deserialize_with = "sf_datetime_opt")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(
        rename = "LastModifiedDate",
        default,
        deserialize_with = "sf_datetime_opt"
    )]
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(rename = "Nickname__c", default)]
    pub nickname: Option<String>,
    #[serde(rename = "Active__c", default)]
    pub active: Option<bool>,
    #[serde(rename = "Email__c", default)]
    pub email: Option<String>,
    #[serde(rename = "Membership_Type__c", default)]
    pub membership_type: Option<String>,
    #[serde(rename = "Membership_Category__c", default)]
    pub membership_category: Option<String>,
    #[serde(rename = "Region__c", default)]
    pub region: Option<String>,
}

/// Envelope of a SOQL contact query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactQueryResponse {
    pub total_size: u32,
    pub done: bool,
    #[serde(default)]
    pub records: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

// --- Client ----------------------------------------------------------------

/// Client for the UP membership data in Salesforce.
pub struct UpClient {
    config: UpConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
    limiter: FixedWindowLimiter,
    cache: ResponseCache,
}

impl UpClient {
    /// Create a client over the given cache backend.
    ///
    /// # Errors
    ///
    /// Fails if the pooled HTTP client cannot be built.
    pub fn new(config: UpConfig, backend: Arc<dyn CacheBackend>) -> SyncResult<Self> {
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

    /// Exchange the long-lived refresh token for a fresh access token.
    async fn refresh_access_token(&self) -> SyncResult<String> {
        let timeout_secs = REQUEST_TIMEOUT.as_secs();
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::from_http(e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::from_http(e, timeout_secs))?;
        token
            .access_token
            .ok_or_else(|| SyncError::upstream("token refresh returned no access_token"))
    }

    async fn request(
        &self,
        suffix: &str,
        params: &[(&str, &str)],
    ) -> SyncResult<(Vec<u8>, Option<String>)> {
        self.limiter.check("up_request").await?;

        // the access key is refreshed before every call
        let token = self.refresh_access_token().await?;

        let url = format!("{}{}", self.config.base_url, suffix);
        let timeout_secs = REQUEST_TIMEOUT.as_secs();

        let (body, cache_control) = self
            .retry
            .execute("up_request", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = token.clone();
                async move {
                    let response = http
                        .get(&url)
                        .query(params)
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
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
            .await?;

        // Salesforce reports some failures inside a 200 body
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(&body) {
            if let Some(code) = map.get("errorCode") {
                return Err(SyncError::upstream(code.to_string()));
            }
        }

        Ok((body, cache_control))
    }

    fn parse_contacts(body: &[u8]) -> Option<ContactQueryResponse> {
        match serde_json::from_slice(body) {
            Ok(response) => Some(response),
            Err(error) => {
                error!(%error, "error parsing UP search response");
                None
            }
        }
    }
}

fn outcome_from(response: ContactQueryResponse) -> SearchOutcome {
    if response.total_size > 0 {
        SearchOutcome::Found(SearchHit::Up(response))
    } else {
        SearchOutcome::NotFound
    }
}

#[async_trait]
impl SyncApi for UpClient {
    fn system(&self) -> SyncSystem {
        SyncSystem::Up
    }

    async fn search(&self, email: &str) -> SyncResult<SearchOutcome> {
        validate_email(email)?;

        let cache_key = format!("UP_api_search_{email}");
        if let Some(body) = self.cache.get(&cache_key).await {
            return Ok(Self::parse_contacts(&body).map_or(SearchOutcome::NotFound, outcome_from));
        }

        let soql = format!(
            "SELECT Id, Name, Email, AccountId, Current_Staff__c \
             FROM Contact WHERE Email = '{email}'"
        );
        let (body, cache_control) = match self.request(QUERY_URL, &[("q", &soql)]).await {
            Ok(result) => result,
            Err(error @ SyncError::RateLimited(_)) => return Err(error),
            Err(error) => {
                error!(%error, "request to UP API failed");
                return Ok(SearchOutcome::NotFound);
            }
        };

        match Self::parse_contacts(&body) {
            Some(response) => {
                self.cache
                    .store(&cache_key, &body, cache_control.as_deref())
                    .await;
                Ok(outcome_from(response))
            }
            None => Ok(SearchOutcome::NotFound),
        }
    }

    fn sync_id(&self, outcome: &SearchOutcome) -> Option<String> {
        match outcome {
            SearchOutcome::Found(SearchHit::Up(response)) => response
                .records
                .first()
                .and_then(|contact| contact.account_id.clone()),
            _ => None,
        }
    }

    async fn get_user_info(&self, sync_id: &str) -> SyncResult<MemberPayload> {
        let cache_key = format!("UP_api_user_info_{sync_id}");

        if let Some(body) = self.cache.get(&cache_key).await {
            let account: Account = serde_json::from_slice(&body)
                .map_err(|e| SyncError::parse(SyncSystem::Up, e.to_string()))?;
            return Ok(MemberPayload::Up(Box::new(account)));
        }

        let suffix = format!("sobjects/Account/{sync_id}");
        let (body, cache_control) = self.request(&suffix, &[]).await?;
        let account: Account = serde_json::from_slice(&body)
            .map_err(|e| SyncError::parse(SyncSystem::Up, e.to_string()))?;
        self.cache
            .store(&cache_key, &body, cache_control.as_deref())
            .await;
        Ok(MemberPayload::Up(Box::new(account)))
    }

    async fn is_member(&self, sync_id: &str) -> bool {
        match self.get_user_info(sync_id).await {
            Ok(MemberPayload::Up(account)) => !account.id.is_empty(),
            Ok(_) => false,
            Err(error) => {
                error!(%error, sync_id, "UP member lookup failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_offset_without_colon() {
        let dt = parse_sf_datetime("2025-11-06T13:56:42.000+0000").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-11-06T13:56:42+00:00");
    }

    #[test]
    fn accepts_colon_offset_and_zulu() {
        assert!(parse_sf_datetime("2025-11-06T13:56:42+00:00").is_some());
        assert!(parse_sf_datetime("2025-11-06T13:56:42Z").is_some());
    }

    #[test]
    fn rejects_garbage_datetime() {
        assert!(parse_sf_datetime("last tuesday").is_none());
    }

    #[test]
    fn account_parses_salesforce_payload() {
        let body = r#"{
            "attributes": {"type": "Account", "url": "/services/data/v58.0/sobjects/Account/001xx"},
            "Id": "001xx",
            "Name": "Example Press",
            "IsDeleted": false,
            "Membership_Type__c": "Regular",
            "CreatedDate": "2020-01-15T09:30:00.000+0000"
        }"#;
        let account: Account = serde_json::from_str(body).unwrap();
        assert_eq!(account.id, "001xx");
        assert_eq!(account.membership_type.as_deref(), Some("Regular"));
        assert!(account.created_date.is_some());
    }

    #[test]
    fn contact_query_response_parses() {
        let body = r#"{"totalSize":1,"done":true,"records":[
            {"Id":"003xx","Name":"A Person","Email":"a@b.com","AccountId":"001xx"}]}"#;
        let response: ContactQueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.total_size, 1);
        assert_eq!(response.records[0].account_id.as_deref(), Some("001xx"));
    }
}
