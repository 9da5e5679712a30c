//! Server configuration loaded from environment variables

use phynite_common::{constants::DEFAULT_RATE_LIMIT, Environment, Settings};
use rand::RngCore;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,

    /// Port for HTTP traffic
    pub port: u16,

    /// PostgreSQL connection string; in-memory storage when unset
    pub database_url: Option<String>,

    /// Bearer token for admin routes; empty disables them
    pub admin_token: String,

    /// HMAC key for form-session tokens
    pub form_secret: Vec<u8>,

    /// Values used to seed a fresh settings store
    pub seed: SeedSettings,
}

/// Settings applied when the settings store is empty
#[derive(Debug, Clone)]
pub struct SeedSettings {
    pub environment: Environment,
    pub stewie_url: Option<String>,
    pub api_key: String,
    pub rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("SIGNUP_ENVIRONMENT")
            .map(|e| Environment::parse_or_default(&e))
            .unwrap_or_default();

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database_url: env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
            admin_token: {
                let token = env::var("ADMIN_TOKEN").unwrap_or_default();
                if token.is_empty() {
                    tracing::warn!("ADMIN_TOKEN not set, admin routes are disabled");
                }
                token
            },
            form_secret: match env::var("FORM_SECRET") {
                Ok(secret) if !secret.is_empty() => secret.into_bytes(),
                _ => {
                    if environment == Environment::Production {
                        tracing::warn!("SECURITY WARNING: FORM_SECRET not set in production!");
                    }
                    tracing::warn!("Using a random FORM_SECRET, form tokens will not survive a restart");
                    let mut secret = vec![0u8; 32];
                    rand::thread_rng().fill_bytes(&mut secret);
                    secret
                }
            },
            seed: SeedSettings {
                environment,
                stewie_url: env::var("STEWIE_URL").ok().filter(|u| !u.is_empty()),
                api_key: env::var("STEWIE_API_KEY").unwrap_or_default(),
                rate_limit: match env::var("RATE_LIMIT") {
                    Ok(v) => v.parse().map_err(|_| ConfigError::InvalidRateLimit(v))?,
                    Err(_) => DEFAULT_RATE_LIMIT,
                },
            },
        })
    }

    /// Settings record for a store that has never been written
    pub fn seed_settings(&self) -> Settings {
        let defaults = Settings::default();
        let candidate = Settings {
            api_key: self.seed.api_key.clone(),
            stewie_url: self
                .seed
                .stewie_url
                .clone()
                .unwrap_or_else(|| self.seed.environment.default_api_url().to_string()),
            environment: self.seed.environment,
            rate_limit: self.seed.rate_limit,
            ..Settings::default()
        };
        candidate.sanitize(&defaults)
    }

    pub fn admin_enabled(&self) -> bool {
        !self.admin_token.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid RATE_LIMIT value: {0}")]
    InvalidRateLimit(String),
}
