//! Subcommand implementations.

use clap::Args;
use kc_cache::{CacheBackend, InMemoryCache};
use kc_core::SyncSystem;
use kc_sync::arlisna::ArlisnaClient;
use kc_sync::config::{ArlisnaConfig, MlaConfig, SyncSettings, SystemMapping, UpConfig};
use kc_sync::engine::{SyncEngine, SyncOptions};
use kc_sync::mla::MlaClient;
use kc_sync::msu::MsuClient;
use kc_sync::store::PgProfileStore;
use kc_sync::traits::SyncApi;
use kc_sync::up::UpClient;
use kc_sync::SyncError;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

pub type CliResult<T> = Result<T, SyncError>;

#[derive(Args)]
pub struct MlaArgs {
    /// Email address to look up
    pub email: String,

    #[arg(long, env = "MLA_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, env = "MLA_API_SECRET", hide_env_values = true)]
    pub api_secret: String,
}

#[derive(Args)]
pub struct ArlisnaArgs {
    /// Email address to look up
    pub email: String,

    #[arg(long, env = "ARLISNA_API_BASE_URL")]
    pub base_url: String,

    #[arg(long, env = "ARLISNA_API_TOKEN", hide_env_values = true)]
    pub api_token: String,
}

#[derive(Args)]
pub struct UpArgs {
    /// Email address to look up
    pub email: String,

    #[arg(long, env = "UP_API_BASE_URL")]
    pub base_url: String,

    #[arg(long, env = "UP_CLIENT_ID", hide_env_values = true)]
    pub client_id: String,

    #[arg(long, env = "UP_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    #[arg(long, env = "UP_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: String,
}

#[derive(Args)]
pub struct MsuArgs {
    /// Email address to check
    pub email: String,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Username of the profile to sync
    pub username: String,

    /// Sync even if the cooldown window has not elapsed
    #[arg(long)]
    pub force: bool,

    /// Skip the post-sync webhook pings
    #[arg(long)]
    pub no_webhooks: bool,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "MLA_API_KEY", hide_env_values = true)]
    pub mla_api_key: String,

    #[arg(long, env = "MLA_API_SECRET", hide_env_values = true)]
    pub mla_api_secret: String,

    #[arg(long, env = "ARLISNA_API_BASE_URL")]
    pub arlisna_base_url: String,

    #[arg(long, env = "ARLISNA_API_TOKEN", hide_env_values = true)]
    pub arlisna_api_token: String,

    #[arg(long, env = "UP_API_BASE_URL")]
    pub up_base_url: String,

    #[arg(long, env = "UP_CLIENT_ID", hide_env_values = true)]
    pub up_client_id: String,

    #[arg(long, env = "UP_CLIENT_SECRET", hide_env_values = true)]
    pub up_client_secret: String,

    #[arg(long, env = "UP_REFRESH_TOKEN", hide_env_values = true)]
    pub up_refresh_token: String,

    /// Webhook URLs to ping after the sync, comma separated
    #[arg(long, env = "WEBHOOK_URLS", value_delimiter = ',')]
    pub webhook_urls: Vec<String>,

    #[arg(long, env = "WEBHOOK_TOKEN", hide_env_values = true, default_value = "")]
    pub webhook_token: String,
}

/// Search, resolve a sync ID and report membership for one client.
async fn check(api: &dyn SyncApi, email: &str) -> CliResult<()> {
    info!(system = %api.system(), email, "searching");
    let outcome = api.search(email).await?;

    match api.sync_id(&outcome) {
        Some(sync_id) => {
            let active = api.is_member(&sync_id).await;
            let groups = api.groups(&sync_id).await;
            println!(
                "{} membership: [{}] (sync id {sync_id}, groups {groups:?})",
                api.system(),
                if active { "active" } else { "inactive" },
            );
        }
        None => println!("no account found on {} server", api.system()),
    }
    Ok(())
}

pub async fn run_mla(args: MlaArgs) -> CliResult<()> {
    let config = MlaConfig {
        base_url: "https://api.mla.org/2/".to_string(),
        api_key: args.api_key,
        api_secret: args.api_secret,
        cache_ttl_secs: 3600,
    };
    let client = MlaClient::new(config, Arc::new(InMemoryCache::new()))?;
    check(&client, &args.email).await
}

pub async fn run_arlisna(args: ArlisnaArgs) -> CliResult<()> {
    let config = ArlisnaConfig {
        base_url: args.base_url,
        api_token: args.api_token,
        cache_ttl_secs: 3600,
    };
    let client = ArlisnaClient::new(config, Arc::new(InMemoryCache::new()))?;
    check(&client, &args.email).await
}

pub async fn run_up(args: UpArgs) -> CliResult<()> {
    let config = UpConfig {
        base_url: args.base_url,
        token_url: "https://aupresses.my.salesforce.com/services/oauth2/token".to_string(),
        client_id: args.client_id,
        client_secret: args.client_secret,
        refresh_token: args.refresh_token,
        cache_ttl_secs: 3600,
    };
    let client = UpClient::new(config, Arc::new(InMemoryCache::new()))?;
    check(&client, &args.email).await
}

pub async fn run_msu(args: MsuArgs) -> CliResult<()> {
    check(&MsuClient::new(), &args.email).await
}

pub async fn run_sync(args: SyncArgs) -> CliResult<()> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await
        .map_err(SyncError::database)?;
    let store = Arc::new(PgProfileStore::new(pool));
    let backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());

    let settings = SyncSettings {
        systems: vec![
            SystemMapping {
                system: SyncSystem::Mla,
                organizations: vec!["mla".to_string()],
            },
            SystemMapping {
                system: SyncSystem::Arlisna,
                organizations: vec!["arlisna".to_string()],
            },
            SystemMapping {
                system: SyncSystem::Up,
                organizations: vec!["up".to_string()],
            },
            SystemMapping {
                system: SyncSystem::Msu,
                organizations: vec!["msu".to_string()],
            },
        ],
        webhook_urls: args.webhook_urls,
        webhook_token: args.webhook_token,
        ..SyncSettings::default()
    };

    let mla = MlaClient::new(
        MlaConfig {
            base_url: "https://api.mla.org/2/".to_string(),
            api_key: args.mla_api_key,
            api_secret: args.mla_api_secret,
            cache_ttl_secs: 3600,
        },
        Arc::clone(&backend),
    )?;
    let arlisna = ArlisnaClient::new(
        ArlisnaConfig {
            base_url: args.arlisna_base_url,
            api_token: args.arlisna_api_token,
            cache_ttl_secs: 3600,
        },
        Arc::clone(&backend),
    )?;
    let up = UpClient::new(
        UpConfig {
            base_url: args.up_base_url,
            token_url: "https://aupresses.my.salesforce.com/services/oauth2/token".to_string(),
            client_id: args.up_client_id,
            client_secret: args.up_client_secret,
            refresh_token: args.up_refresh_token,
            cache_ttl_secs: 3600,
        },
        Arc::clone(&backend),
    )?;

    let engine = SyncEngine::new(store, settings)?
        .with_api(Arc::new(mla))
        .with_api(Arc::new(arlisna))
        .with_api(Arc::new(up))
        .with_api(Arc::new(MsuClient::new()));

    let memberships = engine
        .sync(
            &args.username,
            SyncOptions {
                force: args.force,
                send_webhooks: !args.no_webhooks,
            },
        )
        .await?;

    println!("memberships for {}:", args.username);
    let mut entries: Vec<_> = memberships.iter().collect();
    entries.sort();
    for (system, member) in entries {
        println!("  {system}: {}", if *member { "member" } else { "not a member" });
    }
    Ok(())
}
