//! Settings store: the single configuration record read on every request

use crate::db::{self, StoreError};
use phynite_common::Settings;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub enum SettingsStore {
    Local(Arc<RwLock<Settings>>),
    Postgres(PgPool),
}

impl SettingsStore {
    pub fn local(initial: Settings) -> Self {
        SettingsStore::Local(Arc::new(RwLock::new(initial)))
    }

    /// Current settings; defaults when nothing has been saved
    pub async fn load(&self) -> Result<Settings, StoreError> {
        match self {
            SettingsStore::Local(settings) => Ok(settings.read().await.clone()),
            SettingsStore::Postgres(pool) => {
                Ok(db::queries::load_settings(pool).await?.unwrap_or_default())
            }
        }
    }

    /// Sanitize `candidate` against the stored record and persist it
    pub async fn update(&self, candidate: Settings) -> Result<Settings, StoreError> {
        match self {
            SettingsStore::Local(settings) => {
                let mut current = settings.write().await;
                let updated = candidate.sanitize(&current);
                *current = updated.clone();
                Ok(updated)
            }
            SettingsStore::Postgres(pool) => {
                let previous = db::queries::load_settings(pool).await?.unwrap_or_default();
                let updated = candidate.sanitize(&previous);
                db::queries::save_settings(pool, &updated).await?;
                Ok(updated)
            }
        }
    }

    /// Write `initial` only when no record exists yet
    pub async fn seed(&self, initial: &Settings) -> Result<bool, StoreError> {
        match self {
            // The in-memory store is built from the seed
            SettingsStore::Local(_) => Ok(false),
            SettingsStore::Postgres(pool) => Ok(db::queries::seed_settings(pool, initial).await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phynite_common::{settings::mask_secret, Environment};

    #[tokio::test]
    async fn test_update_sanitizes_and_persists() {
        let store = SettingsStore::local(Settings {
            api_key: "sk_live_abcdef1234".to_string(),
            ..Settings::default()
        });

        let candidate = Settings {
            api_key: mask_secret("sk_live_abcdef1234"),
            environment: Environment::Staging,
            rate_limit: 0,
            ..Settings::default()
        };
        let updated = store.update(candidate).await.unwrap();
        assert_eq!(updated.api_key, "sk_live_abcdef1234");
        assert_eq!(updated.rate_limit, 1);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.environment, Environment::Staging);
        assert_eq!(loaded.api_key, "sk_live_abcdef1234");
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_postgres_seed_once_then_update(pool: PgPool) {
        let store = SettingsStore::Postgres(pool);
        assert_eq!(store.load().await.unwrap(), Settings::default());

        let seed = Settings {
            api_key: "sk_live_seeded_1234".to_string(),
            ..Settings::default()
        };
        assert!(store.seed(&seed).await.unwrap());
        assert!(!store.seed(&Settings::default()).await.unwrap());

        let updated = store
            .update(Settings {
                api_key: mask_secret("sk_live_seeded_1234"),
                rate_limit: 12,
                ..Settings::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.api_key, "sk_live_seeded_1234");
        assert_eq!(store.load().await.unwrap().rate_limit, 12);
    }

    #[tokio::test]
    async fn test_local_seed_is_noop() {
        let store = SettingsStore::local(Settings::default());
        assert!(!store.seed(&Settings::default()).await.unwrap());
    }
}
