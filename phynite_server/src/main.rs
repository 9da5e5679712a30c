//! Phynite Signup Server - signup proxy for Phynite Analytics
//!
//! This server handles:
//! - Form sessions and bot screening for the signup form
//! - Per-IP rate limiting with temporary blocks
//! - Proxying existence checks, checkout creation and product listing
//!   to the upstream billing API
//! - Admin settings and maintenance endpoints

mod abuse;
mod cache;
mod config;
mod db;
mod error;
mod routes;
mod session;
mod settings;
mod stewie;

#[cfg(test)]
mod testing;

use abuse::{RateLimitStore, RateLimiter};
use settings::SettingsStore;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,phynite_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Starting Phynite signup server on {}:{}", config.host, config.port);
    tracing::info!("Environment: {}", config.seed.environment.as_str());

    // Select storage
    let (settings_store, rate_limit_store, db_pool) = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::init_pool(url).await?;
            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await?;
            (
                SettingsStore::Postgres(pool.clone()),
                RateLimitStore::Postgres(pool.clone()),
                Some(pool),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage (state is lost on restart)");
            (
                SettingsStore::local(config.seed_settings()),
                RateLimitStore::local(),
                None,
            )
        }
    };

    if settings_store.seed(&config.seed_settings()).await? {
        tracing::info!("Seeded settings from environment");
    }

    let settings = settings_store.load().await?;
    if !settings.has_api_key() {
        tracing::warn!("No upstream API key configured, signup calls will fail until one is set");
    }
    tracing::info!("Upstream API: {}", settings.api_base_url());

    // Create app state
    let state = routes::AppState::new(config.clone(), settings_store, RateLimiter::new(rate_limit_store), db_pool)?;
    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
