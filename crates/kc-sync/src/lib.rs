//! # kc-sync
//!
//! Synchronises a Knowledge Commons profile's membership state against the
//! external society systems it may belong to.
//!
//! ## Architecture
//!
//! Each external system is wrapped by a client implementing the [`SyncApi`]
//! capability trait: search a member directory by email, resolve the
//! system's native member ID, decide active membership from the member
//! record, list membership groups. Clients share the same plumbing: a
//! pooled HTTP client with a 30 s per-call timeout, retry with exponential
//! backoff on retryable 5xx statuses, a fixed-window call budget and a
//! versioned read-through response cache.
//!
//! [`SyncEngine`] orchestrates the clients for one profile: it re-resolves
//! each system's sync ID from the profile's candidate emails, records
//! membership and groups, projects the result onto local role records, and
//! persists the consolidated state through a [`ProfileStore`]. Failures in
//! one system never prevent the others from completing.
//!
//! Downstream systems are notified best-effort via [`webhooks`]; session
//! teardown across federated apps goes through [`logout`].

pub mod arlisna;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logout;
pub mod mla;
pub mod msu;
pub mod store;
pub mod traits;
pub mod up;
pub mod webhooks;

pub use config::{ArlisnaConfig, MlaConfig, SyncSettings, SystemMapping, UpConfig};
pub use engine::{SyncEngine, SyncOptions};
pub use error::{SyncError, SyncResult};
pub use store::{MemoryProfileStore, PgProfileStore, ProfileStore, RoleRecord, RoleStatus, SyncProfile};
pub use traits::{MemberPayload, SearchHit, SearchOutcome, SyncApi};
