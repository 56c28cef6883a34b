//! MLA membership API client.
//!
//! Searches the MLA member directory by email, fetches member records by
//! MLA ID and decides active membership from the record's expiry date.
//! Every request is HMAC-SHA256 signed over the canonicalized URL with the
//! shared API secret.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use hmac::{Hmac, Mac};
use kc_cache::{CacheBackend, FixedWindowLimiter, ResponseCache};
use kc_core::{validate_email, SyncSystem, RELEASE_VERSION};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};
use url::form_urlencoded;

use crate::config::MlaConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{build_client, RetryPolicy, REQUEST_TIMEOUT};
use crate::traits::{MemberPayload, SearchHit, SearchOutcome, SyncApi};

type HmacSha256 = Hmac<Sha256>;

/// Percent-encoding with no characters considered safe beyond the
/// unreserved set, matching the canonicalization the MLA API signs against.
const SIGNATURE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

const MEMBERS_URL: &str = "members";

// --- Response models -------------------------------------------------------

/// Status discriminator carried in every MLA response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaStatus {
    Success,
    Error,
}

/// Common response metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonMeta {
    pub status: MetaStatus,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Address block returned by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleAddress {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    pub country: String,
    #[serde(default)]
    pub address1: Option<String>,
}

/// General info block returned by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleGeneralInfo {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_visible: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub web_site: Option<String>,
    #[serde(default)]
    pub addresses: Vec<SimpleAddress>,
}

/// Membership summary returned by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleMembershipInfo {
    pub class_code: String,
    pub year_joined: String,
    pub membership_years: String,
}

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleSearchResult {
    pub id: String,
    pub membership: SimpleMembershipInfo,
    pub general: SimpleGeneralInfo,
}

/// Result block of a search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleDataBlock {
    pub total_num_results: u32,
    #[serde(default)]
    pub search_results: Vec<SimpleSearchResult>,
}

/// Envelope of a member search. Error responses carry an empty `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub meta: CommonMeta,
    #[serde(default)]
    pub data: Vec<SimpleDataBlock>,
}

/// Membership details returned by ID lookup. Fields are lenient: the API
/// omits most of them for lapsed records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailedMembershipInfo {
    #[serde(default)]
    pub class_code: String,
    #[serde(default)]
    pub year_joined: Option<String>,
    #[serde(default)]
    pub starting_date: Option<String>,
    #[serde(default)]
    pub expiring_date: Option<String>,
    #[serde(default)]
    pub membership_years: Option<String>,
}

/// General info returned by ID lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailedGeneralInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub web_site: Option<String>,
    #[serde(default)]
    pub joined_commons: Option<String>,
    #[serde(default)]
    pub orcid: Option<String>,
}

/// Directory credentials block returned by ID lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authentication {
    pub username: String,
    pub password: String,
    pub membership_status: String,
}

/// Organization affiliation returned by ID lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub convention_code: String,
    #[serde(default)]
    pub position: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub exclude_from_commons: Option<String>,
    #[serde(default)]
    pub primary: Option<String>,
}

/// Full member profile returned by ID lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub authentication: Option<Authentication>,
    pub membership: DetailedMembershipInfo,
    #[serde(default)]
    pub general: Option<DetailedGeneralInfo>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
}

/// Envelope of a member-by-ID response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub meta: CommonMeta,
    #[serde(default)]
    pub data: Vec<MemberProfile>,
}

// --- Client ----------------------------------------------------------------

/// Client for the MLA membership API.
pub struct MlaClient {
    config: MlaConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
    limiter: FixedWindowLimiter,
    cache: ResponseCache,
}

impl MlaClient {
    /// Create a client over the given cache backend.
    ///
    /// # Errors
    ///
    /// Fails if the pooled HTTP client cannot be built.
    pub fn new(config: MlaConfig, backend: Arc<dyn CacheBackend>) -> SyncResult<Self> {
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

    /// Build the fully signed request URL for `suffix` and `params`.
    ///
    /// The signature is an HMAC-SHA256 over `GET&<percent-encoded URL>` and
    /// is appended as the final `signature` query parameter, so the query
    /// string sent over the wire is byte-identical to the one signed.
    fn signed_url(&self, suffix: &str, params: &[(&str, String)]) -> String {
        let query: String = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        let url = format!("{}{}?{}", self.config.base_url, suffix, query);
        debug!(url, "building signature");

        let base_string = format!("GET&{}", utf8_percent_encode(&url, SIGNATURE_SET));

        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.config.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(base_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        format!("{url}&signature={signature}")
    }

    /// Perform one rate-limited, retried GET and return the body along with
    /// the `Cache-Control` header, if any.
    async fn request(
        &self,
        suffix: &str,
        params: &[(&str, String)],
    ) -> SyncResult<(Vec<u8>, Option<String>)> {
        self.limiter.check("mla_request").await?;

        let url = self.signed_url(suffix, params);
        let timeout_secs = REQUEST_TIMEOUT.as_secs();

        self.retry
            .execute("mla_request", || {
                let http = self.http.clone();
                let url = url.clone();
                async move {
                    let response = http
                        .get(&url)
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
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

    fn parse_search(&self, body: &[u8]) -> Option<SearchResponse> {
        match serde_json::from_slice::<SearchResponse>(body) {
            Ok(response) => Some(response),
            Err(error) => {
                error!(%error, "error parsing MLA search response");
                None
            }
        }
    }

    fn outcome_from(response: SearchResponse) -> SearchOutcome {
        let positive = response.meta.status == MetaStatus::Success
            && response
                .data
                .first()
                .is_some_and(|block| block.total_num_results > 0);
        if positive {
            SearchOutcome::Found(SearchHit::Mla(response))
        } else {
            SearchOutcome::NotFound
        }
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl SyncApi for MlaClient {
    fn system(&self) -> SyncSystem {
        SyncSystem::Mla
    }

    async fn search(&self, email: &str) -> SyncResult<SearchOutcome> {
        validate_email(email)?;

        let cache_key = format!("mla_search_{email}");
        if let Some(body) = self.cache.get(&cache_key).await {
            return Ok(self
                .parse_search(&body)
                .map_or(SearchOutcome::NotFound, Self::outcome_from));
        }

        let params = [
            ("email", email.to_string()),
            ("membership_status", "ALL".to_string()),
            ("timestamp", unix_timestamp().to_string()),
            ("key", self.config.api_key.clone()),
        ];
        let (body, cache_control) = match self.request(MEMBERS_URL, &params).await {
            Ok(result) => result,
            Err(error @ SyncError::RateLimited(_)) => return Err(error),
            Err(error) => {
                error!(%error, "request to MLA API failed");
                return Ok(SearchOutcome::NotFound);
            }
        };

        match self.parse_search(&body) {
            Some(response) => {
                self.cache
                    .store(&cache_key, &body, cache_control.as_deref())
                    .await;
                Ok(Self::outcome_from(response))
            }
            None => Ok(SearchOutcome::NotFound),
        }
    }

    fn sync_id(&self, outcome: &SearchOutcome) -> Option<String> {
        match outcome {
            SearchOutcome::Found(SearchHit::Mla(response)) => response
                .data
                .first()
                .and_then(|block| block.search_results.first())
                .map(|result| result.id.clone()),
            _ => None,
        }
    }

    async fn get_user_info(&self, sync_id: &str) -> SyncResult<MemberPayload> {
        let cache_key = format!("mla_user_info_{sync_id}");

        if let Some(body) = self.cache.get(&cache_key).await {
            let response: MemberResponse = serde_json::from_slice(&body)
                .map_err(|e| SyncError::parse(SyncSystem::Mla, e.to_string()))?;
            return Ok(MemberPayload::Mla(Box::new(response)));
        }

        let params = [
            ("timestamp", unix_timestamp().to_string()),
            ("key", self.config.api_key.clone()),
        ];
        let suffix = format!("{MEMBERS_URL}/{sync_id}");
        let (body, cache_control) = self.request(&suffix, &params).await?;
        let response: MemberResponse = serde_json::from_slice(&body)
            .map_err(|e| SyncError::parse(SyncSystem::Mla, e.to_string()))?;
        self.cache
            .store(&cache_key, &body, cache_control.as_deref())
            .await;
        Ok(MemberPayload::Mla(Box::new(response)))
    }

    async fn is_member(&self, sync_id: &str) -> bool {
        let response = match self.get_user_info(sync_id).await {
            Ok(MemberPayload::Mla(response)) => response,
            Ok(_) => return false,
            Err(error) => {
                error!(%error, sync_id, "MLA member lookup failed");
                return false;
            }
        };

        if response.meta.status != MetaStatus::Success {
            return false;
        }
        let Some(profile) = response.data.first() else {
            return false;
        };
        let Some(raw) = profile.membership.expiring_date.as_deref() else {
            return false;
        };

        match NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
            Ok(expiring_date) => expiring_date > Utc::now().date_naive(),
            Err(error) => {
                warn!(%error, raw, "error parsing date in MLA response");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kc_cache::InMemoryCache;

    fn client() -> MlaClient {
        let config = MlaConfig {
            base_url: "https://api.mla.example/2/".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            cache_ttl_secs: 3600,
        };
        MlaClient::new(config, Arc::new(InMemoryCache::new())).unwrap()
    }

    #[test]
    fn signed_url_appends_signature_last() {
        let client = client();
        let url = client.signed_url("members", &[("email", "a@b.com".to_string())]);
        assert!(url.starts_with("https://api.mla.example/2/members?email=a%40b.com&signature="));
        let signature = url.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic() {
        let client = client();
        let params = [("email", "a@b.com".to_string())];
        assert_eq!(
            client.signed_url("members", &params),
            client.signed_url("members", &params)
        );
    }

    #[test]
    fn zero_results_is_not_found() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"meta":{"status":"success","code":"200"},
                "data":[{"total_num_results":0,"search_results":[]}]}"#,
        )
        .unwrap();
        assert!(!MlaClient::outcome_from(response).is_found());
    }

    #[test]
    fn error_envelope_is_not_found() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"meta":{"status":"error","code":"401","message":"bad signature"},"data":[]}"#,
        )
        .unwrap();
        assert!(!MlaClient::outcome_from(response).is_found());
    }

    #[test]
    fn lenient_member_profile_parses_minimal_payload() {
        let response: MemberResponse = serde_json::from_str(
            r#"{"meta":{"status":"success","code":"200"},
                "data":[{"membership":{"expiring_date":"31/12/2099"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            response.data[0].membership.expiring_date.as_deref(),
            Some("31/12/2099")
        );
    }
}
