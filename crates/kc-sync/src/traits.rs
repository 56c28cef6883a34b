//! Capability trait for external membership systems.

use async_trait::async_trait;
use kc_core::SyncSystem;
use tracing::{debug, info};

use crate::arlisna::MembersSearchResponse;
use crate::error::SyncResult;
use crate::mla::{MemberResponse, SearchResponse};
use crate::up::{Account, ContactQueryResponse};

/// The parsed payload of a positive directory search, tagged by system.
#[derive(Debug, Clone)]
pub enum SearchHit {
    /// MLA member search response.
    Mla(SearchResponse),
    /// ARLISNA member search response.
    Arlisna(MembersSearchResponse),
    /// UP (Salesforce) contact query response.
    Up(ContactQueryResponse),
    /// MSU matches on the email address itself.
    Msu(String),
}

/// Result of searching a member directory by email.
///
/// Transient upstream failures and unparsable payloads are logged inside
/// the client and collapse to [`SearchOutcome::NotFound`]; only malformed
/// caller input is surfaced as an error.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// At least one matching member record was found.
    Found(SearchHit),
    /// The directory reported no match.
    NotFound,
}

impl SearchOutcome {
    /// Whether the search produced a match.
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }
}

/// A member record fetched by native ID, tagged by system.
#[derive(Debug, Clone)]
pub enum MemberPayload {
    /// MLA detailed member profile response.
    Mla(Box<MemberResponse>),
    /// ARLISNA member lookup (the API only exposes search-shaped results).
    Arlisna(Box<MembersSearchResponse>),
    /// UP (Salesforce) Account record.
    Up(Box<Account>),
}

/// Capability contract implemented by every external membership system.
///
/// Object-safe so the reconciliation engine can hold a heterogeneous set of
/// clients.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// The system this client talks to.
    fn system(&self) -> SyncSystem;

    /// Search the member directory by email address.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::SyncError::InvalidInput`] on a malformed address.
    /// Upstream and parse failures are logged and reported as
    /// [`SearchOutcome::NotFound`], never as errors.
    async fn search(&self, email: &str) -> SyncResult<SearchOutcome>;

    /// Search with several candidate addresses, first hit wins.
    ///
    /// Caller-supplied order is preserved; a candidate that fails validation
    /// or whose lookup fails is skipped and the next one is tried.
    async fn search_multiple(&self, emails: &[String]) -> SearchOutcome {
        for email in emails {
            info!(system = %self.system(), email, "searching member directory");
            match self.search(email).await {
                Ok(outcome @ SearchOutcome::Found(_)) => return outcome,
                Ok(SearchOutcome::NotFound) => {}
                Err(error) => {
                    debug!(system = %self.system(), email, %error, "candidate skipped");
                }
            }
        }
        SearchOutcome::NotFound
    }

    /// Extract the system's native member ID from a positive search outcome.
    ///
    /// Returns `None` for [`SearchOutcome::NotFound`] and for hits belonging
    /// to a different system.
    fn sync_id(&self, outcome: &SearchOutcome) -> Option<String>;

    /// Fetch the full member record by native ID.
    async fn get_user_info(&self, sync_id: &str) -> SyncResult<MemberPayload>;

    /// Whether the member's subscription is currently active.
    ///
    /// Fail-closed: any upstream failure, missing expiry or unparsable date
    /// yields `false`. Never fails.
    async fn is_member(&self, sync_id: &str) -> bool;

    /// The member's groups within the system.
    ///
    /// None of the upstream systems expose a groups endpoint yet, so the
    /// default implementation returns an empty list; the method is part of
    /// the contract so group data can be adopted without an interface
    /// change.
    async fn groups(&self, _sync_id: &str) -> Vec<String> {
        Vec::new()
    }
}
