//! Profile and role persistence for the reconciliation engine.
//!
//! The engine reads and writes through the [`ProfileStore`] trait;
//! [`PgProfileStore`] is the Postgres implementation and
//! [`MemoryProfileStore`] backs tests and examples.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kc_core::{ProfileId, RoleId};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::error::{SyncError, SyncResult};

/// Status of a local authorization role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleStatus {
    Active,
    Expired,
}

impl RoleStatus {
    /// The stable string form stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleStatus::Active => "active",
            RoleStatus::Expired => "expired",
        }
    }
}

impl FromStr for RoleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RoleStatus::Active),
            "expired" => Ok(RoleStatus::Expired),
            other => Err(format!("unknown role status: {other}")),
        }
    }
}

/// A local authorization role tied to a user and an organization.
///
/// Created by the enrollment flows; the reconciliation engine only ever
/// flips its status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub username: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    pub status: RoleStatus,
}

/// The slice of a profile the sync engine reads and writes.
///
/// The three maps are keyed by system name. Absence of a key means the
/// system was never resolved for this profile, which is distinct from a
/// present-but-negative value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProfile {
    pub id: ProfileId,
    pub username: String,
    /// Primary email address.
    pub email: String,
    /// Additional confirmed addresses, in preference order.
    #[serde(default)]
    pub emails: Vec<String>,
    /// System name -> resolved external member ID (a present `None` means
    /// the last resolution found nothing).
    #[serde(default)]
    pub external_sync_ids: HashMap<String, Option<String>>,
    /// System name -> membership groups.
    #[serde(default)]
    pub in_membership_groups: HashMap<String, Vec<String>>,
    /// System name -> membership flag.
    #[serde(default)]
    pub is_member_of: HashMap<String, bool>,
    /// When the profile was last fully synced.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncProfile {
    /// All candidate addresses in search order: primary first, then the
    /// confirmed aliases.
    #[must_use]
    pub fn candidate_emails(&self) -> Vec<String> {
        let mut emails = Vec::with_capacity(1 + self.emails.len());
        emails.push(self.email.clone());
        emails.extend(self.emails.iter().cloned());
        emails
    }
}

/// Persistence boundary for the reconciliation engine.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load the sync slice of a profile by username.
    async fn load_profile(&self, username: &str) -> SyncResult<Option<SyncProfile>>;

    /// Persist the profile's sync maps and `last_sync` marker.
    async fn save_sync_state(&self, profile: &SyncProfile) -> SyncResult<()>;

    /// All roles belonging to the user.
    async fn roles_for(&self, username: &str) -> SyncResult<Vec<RoleRecord>>;

    /// Update one role's status.
    async fn set_role_status(&self, id: RoleId, status: RoleStatus) -> SyncResult<()>;
}

// --- Postgres --------------------------------------------------------------

/// Postgres-backed [`ProfileStore`].
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn load_profile(&self, username: &str) -> SyncResult<Option<SyncProfile>> {
        let row = sqlx::query(
            "SELECT id, username, email, emails, external_sync_ids, \
                    in_membership_groups, is_member_of, last_sync \
             FROM profiles WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: uuid::Uuid = row.try_get("id").map_err(SyncError::database)?;
        let emails: Option<Json<Vec<String>>> =
            row.try_get("emails").map_err(SyncError::database)?;
        let sync_ids: Option<Json<HashMap<String, Option<String>>>> = row
            .try_get("external_sync_ids")
            .map_err(SyncError::database)?;
        let groups: Option<Json<HashMap<String, Vec<String>>>> = row
            .try_get("in_membership_groups")
            .map_err(SyncError::database)?;
        let memberships: Option<Json<HashMap<String, bool>>> =
            row.try_get("is_member_of").map_err(SyncError::database)?;

        Ok(Some(SyncProfile {
            id: ProfileId::from_uuid(id),
            username: row.try_get("username").map_err(SyncError::database)?,
            email: row.try_get("email").map_err(SyncError::database)?,
            emails: emails.map(|j| j.0).unwrap_or_default(),
            external_sync_ids: sync_ids.map(|j| j.0).unwrap_or_default(),
            in_membership_groups: groups.map(|j| j.0).unwrap_or_default(),
            is_member_of: memberships.map(|j| j.0).unwrap_or_default(),
            last_sync: row.try_get("last_sync").map_err(SyncError::database)?,
        }))
    }

    async fn save_sync_state(&self, profile: &SyncProfile) -> SyncResult<()> {
        sqlx::query(
            "UPDATE profiles \
             SET external_sync_ids = $2, in_membership_groups = $3, \
                 is_member_of = $4, last_sync = $5 \
             WHERE id = $1",
        )
        .bind(profile.id.as_uuid())
        .bind(Json(&profile.external_sync_ids))
        .bind(Json(&profile.in_membership_groups))
        .bind(Json(&profile.is_member_of))
        .bind(profile.last_sync)
        .execute(&self.pool)
        .await
        .map_err(SyncError::database)?;
        Ok(())
    }

    async fn roles_for(&self, username: &str) -> SyncResult<Vec<RoleRecord>> {
        let rows = sqlx::query(
            "SELECT id, username, organization, affiliation, status \
             FROM roles WHERE username = $1",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(SyncError::database)?;

        rows.into_iter()
            .map(|row| {
                let id: uuid::Uuid = row.try_get("id").map_err(SyncError::database)?;
                let status: String = row.try_get("status").map_err(SyncError::database)?;
                Ok(RoleRecord {
                    id: RoleId::from_uuid(id),
                    username: row.try_get("username").map_err(SyncError::database)?,
                    organization: row.try_get("organization").map_err(SyncError::database)?,
                    affiliation: row.try_get("affiliation").map_err(SyncError::database)?,
                    status: RoleStatus::from_str(&status)
                        .map_err(|message| SyncError::Database {
                            message,
                            source: None,
                        })?,
                })
            })
            .collect()
    }

    async fn set_role_status(&self, id: RoleId, status: RoleStatus) -> SyncResult<()> {
        sqlx::query("UPDATE roles SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(SyncError::database)?;
        Ok(())
    }
}

// --- In-memory -------------------------------------------------------------

/// In-memory [`ProfileStore`] used by the engine's tests.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, SyncProfile>>,
    roles: RwLock<Vec<RoleRecord>>,
}

impl MemoryProfileStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile.
    pub async fn insert_profile(&self, profile: SyncProfile) {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.username.clone(), profile);
    }

    /// Seed a role.
    pub async fn insert_role(&self, role: RoleRecord) {
        let mut roles = self.roles.write().await;
        roles.push(role);
    }

    /// Snapshot a profile by username.
    pub async fn profile(&self, username: &str) -> Option<SyncProfile> {
        let profiles = self.profiles.read().await;
        profiles.get(username).cloned()
    }

    /// Snapshot a role by ID.
    pub async fn role(&self, id: RoleId) -> Option<RoleRecord> {
        let roles = self.roles.read().await;
        roles.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load_profile(&self, username: &str) -> SyncResult<Option<SyncProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(username).cloned())
    }

    async fn save_sync_state(&self, profile: &SyncProfile) -> SyncResult<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.username.clone(), profile.clone());
        Ok(())
    }

    async fn roles_for(&self, username: &str) -> SyncResult<Vec<RoleRecord>> {
        let roles = self.roles.read().await;
        Ok(roles
            .iter()
            .filter(|role| role.username == username)
            .cloned()
            .collect())
    }

    async fn set_role_status(&self, id: RoleId, status: RoleStatus) -> SyncResult<()> {
        let mut roles = self.roles.write().await;
        match roles.iter_mut().find(|role| role.id == id) {
            Some(role) => {
                role.status = status;
                Ok(())
            }
            None => Err(SyncError::Database {
                message: format!("no role with id {id}"),
                source: None,
            }),
        }
    }
}
