//! kc - operator CLI for the Knowledge Commons membership sync services.
//!
//! Look up one email against a single society API, or run the full
//! reconciliation for a profile against the database. Credentials come
//! from the environment; see each subcommand's `--help` for the variable
//! names.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::CliResult;

/// kc - Knowledge Commons membership sync tools
#[derive(Parser)]
#[command(name = "kc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up an email against the MLA API
    Mla(commands::MlaArgs),

    /// Look up an email against the ARLISNA API
    Arlisna(commands::ArlisnaArgs),

    /// Look up an email against the UP (Salesforce) API
    Up(commands::UpArgs),

    /// Check an email against the MSU domain heuristic
    Msu(commands::MsuArgs),

    /// Run the full external sync for one profile
    Sync(commands::SyncArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result: CliResult<()> = match cli.command {
        Commands::Mla(args) => commands::run_mla(args).await,
        Commands::Arlisna(args) => commands::run_arlisna(args).await,
        Commands::Up(args) => commands::run_up(args).await,
        Commands::Msu(args) => commands::run_msu(args).await,
        Commands::Sync(args) => commands::run_sync(args).await,
    };

    if let Err(error) = result {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
