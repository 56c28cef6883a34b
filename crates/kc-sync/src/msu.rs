//! MSU membership check.
//!
//! There is no MSU directory API: an address is a member iff it belongs to
//! the university's email domain, and the resolved sync ID is the matching
//! address itself.

use async_trait::async_trait;
use kc_core::SyncSystem;

use crate::error::{SyncError, SyncResult};
use crate::traits::{MemberPayload, SearchHit, SearchOutcome, SyncApi};

const MSU_DOMAIN: &str = "msu.edu";

/// Domain-suffix membership heuristic for MSU.
#[derive(Debug, Clone, Default)]
pub struct MsuClient {
    domain: String,
}

impl MsuClient {
    /// Create a client for the standard `msu.edu` domain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            domain: MSU_DOMAIN.to_string(),
        }
    }

    fn matches(&self, email: &str) -> bool {
        email.to_lowercase().ends_with(&self.domain)
    }
}

#[async_trait]
impl SyncApi for MsuClient {
    fn system(&self) -> SyncSystem {
        SyncSystem::Msu
    }

    async fn search(&self, email: &str) -> SyncResult<SearchOutcome> {
        if self.matches(email) {
            Ok(SearchOutcome::Found(SearchHit::Msu(email.to_string())))
        } else {
            Ok(SearchOutcome::NotFound)
        }
    }

    fn sync_id(&self, outcome: &SearchOutcome) -> Option<String> {
        match outcome {
            SearchOutcome::Found(SearchHit::Msu(email)) if self.matches(email) => {
                Some(email.clone())
            }
            _ => None,
        }
    }

    async fn get_user_info(&self, _sync_id: &str) -> SyncResult<MemberPayload> {
        Err(SyncError::Unsupported {
            system: SyncSystem::Msu,
            operation: "get_user_info",
        })
    }

    async fn is_member(&self, sync_id: &str) -> bool {
        self.matches(sync_id)
    }
}
