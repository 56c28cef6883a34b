//! Configuration for the sync clients and the reconciliation engine.

use kc_core::SyncSystem;
use serde::{Deserialize, Serialize};

/// Configuration for the MLA client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlaConfig {
    /// API base URL, with trailing slash.
    #[serde(default = "default_mla_base_url")]
    pub base_url: String,
    /// Shared API key sent with every request.
    pub api_key: String,
    /// Shared secret used to HMAC-sign each request.
    pub api_secret: String,
    /// Ceiling on response cache TTL, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_mla_base_url() -> String {
    "https://api.mla.org/2/".to_string()
}

/// Configuration for the ARLISNA client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArlisnaConfig {
    /// API base URL, with trailing slash.
    pub base_url: String,
    /// Pre-encoded HTTP basic auth token.
    pub api_token: String,
    /// Ceiling on response cache TTL, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// Configuration for the UP (Salesforce) client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpConfig {
    /// Salesforce REST base URL, with trailing slash.
    pub base_url: String,
    /// OAuth2 token endpoint used for the refresh-token grant.
    #[serde(default = "default_up_token_url")]
    pub token_url: String,
    /// Connected-app client ID.
    pub client_id: String,
    /// Connected-app client secret.
    pub client_secret: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Ceiling on response cache TTL, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_up_token_url() -> String {
    "https://aupresses.my.salesforce.com/services/oauth2/token".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

/// One configured external system and the local role organizations whose
/// status it governs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMapping {
    /// The external system to query.
    pub system: SyncSystem,
    /// Role organizations set ACTIVE/EXPIRED from this system's result.
    #[serde(default)]
    pub organizations: Vec<String>,
}

/// A membership key derived from local role records alone, no network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalMembershipRule {
    /// Role organization to match, case-insensitive.
    pub organization: String,
    /// Role affiliation to match.
    pub affiliation: String,
    /// Key written into the profile's membership map.
    pub membership_key: String,
}

/// Settings for the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Systems to reconcile, in order.
    pub systems: Vec<SystemMapping>,
    /// Minimum hours between full syncs of one profile.
    #[serde(default = "default_sync_hours")]
    pub sync_hours: u64,
    /// Whether a profile with no resolvable sync ID is recorded as a
    /// non-member (the historical behavior) or left untouched.
    #[serde(default = "default_treat_unresolved_as_nonmember")]
    pub treat_unresolved_as_nonmember: bool,
    /// Membership keys derived from local roles.
    #[serde(default = "default_local_memberships")]
    pub local_memberships: Vec<LocalMembershipRule>,
    /// URLs pinged after each successful sync.
    #[serde(default)]
    pub webhook_urls: Vec<String>,
    /// Bearer token included in webhook pings.
    #[serde(default)]
    pub webhook_token: String,
}

fn default_sync_hours() -> u64 {
    24
}

fn default_treat_unresolved_as_nonmember() -> bool {
    true
}

fn default_local_memberships() -> Vec<LocalMembershipRule> {
    // mirrors the society-settings map on the WordPress side
    vec![LocalMembershipRule {
        organization: "stemedplus".to_string(),
        affiliation: "member".to_string(),
        membership_key: "STEM".to_string(),
    }]
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            systems: Vec::new(),
            sync_hours: default_sync_hours(),
            treat_unresolved_as_nonmember: default_treat_unresolved_as_nonmember(),
            local_memberships: default_local_memberships(),
            webhook_urls: Vec::new(),
            webhook_token: String::new(),
        }
    }
}
