//! Reconciliation engine.
//!
//! Orchestrates the per-system clients for one profile: resolves each
//! system's member ID from the profile's candidate emails, records
//! membership and groups, projects the result onto local role records and
//! persists the consolidated state. Systems are queried concurrently, one
//! task per system, with failures isolated per task; the historical
//! implementation walked the systems sequentially, and the fan-out is a
//! recorded behavior change (DESIGN.md).

use chrono::{Duration, Utc};
use futures::future::join_all;
use kc_core::SyncSystem;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::store::{ProfileStore, RoleStatus};
use crate::traits::SyncApi;
use crate::webhooks::WebhookNotifier;

/// Per-call options for [`SyncEngine::sync`].
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Sync even when the cooldown window has not elapsed.
    pub force: bool,
    /// Ping the configured webhook URLs after a successful sync.
    pub send_webhooks: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force: false,
            send_webhooks: true,
        }
    }
}

/// What one system's pass resolved.
///
/// `member`/`groups` are `None` when the pass declined to record anything
/// (unresolved ID under the leave-untouched policy).
#[derive(Debug)]
struct SystemOutcome {
    system: SyncSystem,
    sync_id: Option<String>,
    member: Option<bool>,
    groups: Option<Vec<String>>,
}

/// The external-membership reconciliation engine.
pub struct SyncEngine {
    apis: HashMap<SyncSystem, Arc<dyn SyncApi>>,
    store: Arc<dyn ProfileStore>,
    settings: SyncSettings,
    notifier: WebhookNotifier,
}

impl SyncEngine {
    /// Create an engine over the given store and settings.
    ///
    /// # Errors
    ///
    /// Fails if the webhook HTTP client cannot be built.
    pub fn new(store: Arc<dyn ProfileStore>, settings: SyncSettings) -> SyncResult<Self> {
        Ok(Self {
            apis: HashMap::new(),
            store,
            settings,
            notifier: WebhookNotifier::new()?,
        })
    }

    /// Register a system client.
    #[must_use]
    pub fn with_api(mut self, api: Arc<dyn SyncApi>) -> Self {
        self.apis.insert(api.system(), api);
        self
    }

    /// Reconcile one profile against every configured system and return the
    /// consolidated membership map.
    ///
    /// Failure of one system never prevents the others from completing; the
    /// call fails only when the profile is missing or persistence fails.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ProfileNotFound`] for an unknown username and
    /// [`SyncError::Database`] when the store cannot be read or written.
    pub async fn sync(
        &self,
        username: &str,
        options: SyncOptions,
    ) -> SyncResult<HashMap<String, bool>> {
        let mut profile = self
            .store
            .load_profile(username)
            .await?
            .ok_or_else(|| SyncError::ProfileNotFound {
                username: username.to_string(),
            })?;

        // don't sync if we've already done so within the cooldown window
        let cooldown = Duration::hours(self.settings.sync_hours as i64);
        if !options.force
            && profile
                .last_sync
                .is_some_and(|last| Utc::now() - last < cooldown)
        {
            info!(username, "external data already synced, using cached version");
            return Ok(profile.is_member_of);
        }

        info!(username, "syncing external data");

        let emails = profile.candidate_emails();
        let passes = self.settings.systems.iter().filter_map(|mapping| {
            let Some(api) = self.apis.get(&mapping.system) else {
                warn!(system = %mapping.system, "no client registered, skipping");
                return None;
            };
            Some(Self::resolve_system(
                Arc::clone(api),
                emails.clone(),
                self.settings.treat_unresolved_as_nonmember,
            ))
        });
        let outcomes = join_all(passes).await;

        for outcome in &outcomes {
            let key = outcome.system.as_str().to_string();
            profile
                .external_sync_ids
                .insert(key.clone(), outcome.sync_id.clone());
            if let Some(member) = outcome.member {
                profile.is_member_of.insert(key.clone(), member);
            }
            if let Some(groups) = &outcome.groups {
                profile.in_membership_groups.insert(key, groups.clone());
            }
        }

        // persist resolved IDs and groups before the role pass so that a
        // role-store failure cannot lose resolution progress
        self.store.save_sync_state(&profile).await?;

        match self.store.roles_for(username).await {
            Ok(roles) => {
                for mapping in &self.settings.systems {
                    let Some(outcome) = outcomes.iter().find(|o| o.system == mapping.system)
                    else {
                        continue;
                    };
                    let Some(member) = outcome.member else {
                        continue;
                    };
                    let status = if member {
                        RoleStatus::Active
                    } else {
                        RoleStatus::Expired
                    };
                    for role in roles.iter().filter(|role| {
                        role.organization
                            .as_deref()
                            .is_some_and(|org| {
                                mapping.organizations.iter().any(|o| o == org)
                            })
                    }) {
                        info!(system = %mapping.system, role = %role.id, ?status, "updating role");
                        if let Err(error) = self.store.set_role_status(role.id, status).await {
                            error!(%error, role = %role.id, "failed to update role status");
                        }
                    }
                }

                for rule in &self.settings.local_memberships {
                    let member = roles.iter().any(|role| {
                        role.organization
                            .as_deref()
                            .is_some_and(|org| org.eq_ignore_ascii_case(&rule.organization))
                            && role.affiliation.as_deref() == Some(rule.affiliation.as_str())
                    });
                    profile
                        .is_member_of
                        .insert(rule.membership_key.clone(), member);
                }
            }
            Err(error) => error!(%error, username, "failed to load roles"),
        }

        profile.last_sync = Some(Utc::now());
        self.store.save_sync_state(&profile).await?;

        if options.send_webhooks {
            self.notifier
                .ping(
                    &self.settings.webhook_urls,
                    &self.settings.webhook_token,
                    username,
                )
                .await;
        }

        info!(username, memberships = ?profile.is_member_of, "sync complete");
        Ok(profile.is_member_of)
    }

    /// One system's pass: resolve a sync ID from the candidate emails, then
    /// membership and groups. Never fails; everything the pass could not
    /// determine is reported as absent.
    async fn resolve_system(
        api: Arc<dyn SyncApi>,
        emails: Vec<String>,
        treat_unresolved_as_nonmember: bool,
    ) -> SystemOutcome {
        let system = api.system();
        let found = api.search_multiple(&emails).await;
        let sync_id = api.sync_id(&found);

        match sync_id {
            Some(id) => {
                info!(%system, sync_id = %id, "resolved sync ID");
                let member = api.is_member(&id).await;
                let groups = api.groups(&id).await;
                SystemOutcome {
                    system,
                    sync_id: Some(id),
                    member: Some(member),
                    groups: Some(groups),
                }
            }
            None if treat_unresolved_as_nonmember => SystemOutcome {
                system,
                sync_id: None,
                member: Some(false),
                groups: Some(Vec::new()),
            },
            None => SystemOutcome {
                system,
                sync_id: None,
                member: None,
                groups: None,
            },
        }
    }
}
