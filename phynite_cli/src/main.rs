//! Phynite CLI - Administer a Phynite signup service
//!
//! Usage:
//!   phynite login <TOKEN> [--server URL]   Store admin credentials
//!   phynite settings show                  Print current settings
//!   phynite settings set <KEY> <VALUE>     Change one setting
//!   phynite test-connection                Check the upstream API
//!   phynite products [--refresh]           List subscription products
//!   phynite cleanup                        Purge old rate limit records
//!   phynite check email <VALUE>            Check if an email is registered
//!   phynite check website <VALUE>          Check if a website is registered

mod client;
mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::check::Target;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "phynite")]
#[command(author = "Phynite Solutions")]
#[command(version)]
#[command(about = "Administer a Phynite signup service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the admin token for a signup server
    Login {
        /// Admin token configured on the server
        token: String,

        /// Server base URL
        #[arg(long)]
        server: Option<String>,
    },

    /// View or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Verify the upstream API key and connectivity
    TestConnection,

    /// List subscription products
    Products {
        /// Clear the server's product cache first
        #[arg(long)]
        refresh: bool,
    },

    /// Purge stale and expired rate limit records
    Cleanup,

    /// Check whether an email or website is already registered
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings (API key masked)
    Show,

    /// Change one setting
    Set {
        /// Field name, e.g. rate_limit or allowed_domains
        key: String,

        /// New value; lists are comma separated
        value: String,
    },
}

#[derive(Subcommand)]
enum CheckTarget {
    /// Check an email address
    Email { value: String },

    /// Check a website URL
    Website { value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},phynite_cli=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    match cli.command {
        Commands::Login { token, server } => {
            commands::login::run(token, server).await?;
        }

        Commands::Settings { action } => match action {
            SettingsAction::Show => commands::settings::show().await?,
            SettingsAction::Set { key, value } => commands::settings::set(&key, &value).await?,
        },

        Commands::TestConnection => {
            commands::maintenance::test_connection().await?;
        }

        Commands::Products { refresh } => {
            commands::maintenance::products(refresh).await?;
        }

        Commands::Cleanup => {
            commands::maintenance::cleanup().await?;
        }

        Commands::Check { target } => {
            let target = match target {
                CheckTarget::Email { value } => Target::Email(value),
                CheckTarget::Website { value } => Target::Website(value),
            };
            commands::check::run(target).await?;
        }
    }

    Ok(())
}
