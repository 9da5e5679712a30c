//! Database connection and queries

use chrono::{DateTime, Utc};
use phynite_common::Settings;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Storage failures, shared by every persisted component
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Rate limit row, one per client IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub ip_address: String,
    pub attempts: i32,
    pub last_attempt: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Database queries
pub mod queries {
    use super::*;

    /// Block end for an IP, if the block is still active at `now`
    pub async fn active_block(
        pool: &PgPool,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT blocked_until FROM signup_rate_limits WHERE ip_address = $1 AND blocked_until > $2",
        )
        .bind(ip)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map(Option::flatten)
    }

    /// Delete rows idle since before `cutoff` that carry no active block
    pub async fn purge_stale(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM signup_rate_limits
            WHERE last_attempt < $1 AND (blocked_until IS NULL OR blocked_until <= $2)
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Attempts recorded for an IP whose last attempt is after `cutoff`
    pub async fn attempts_since(
        pool: &PgPool,
        ip: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u32, sqlx::Error> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "SELECT attempts FROM signup_rate_limits WHERE ip_address = $1 AND last_attempt > $2",
        )
        .bind(ip)
        .bind(cutoff)
        .fetch_optional(pool)
        .await?;

        Ok(attempts.unwrap_or(0).max(0) as u32)
    }

    /// Block an IP until `until`
    pub async fn block_ip(pool: &PgPool, ip: &str, until: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE signup_rate_limits SET blocked_until = $1 WHERE ip_address = $2")
            .bind(until)
            .bind(ip)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record an attempt (increment on conflict), restarting the count
    /// when the previous attempt is older than `cutoff`
    pub async fn record_attempt(
        pool: &PgPool,
        ip: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<u32, sqlx::Error> {
        let attempts: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO signup_rate_limits (ip_address, attempts, last_attempt)
            VALUES ($1, 1, $2)
            ON CONFLICT (ip_address) DO UPDATE SET
                attempts = CASE
                    WHEN signup_rate_limits.last_attempt <= $3 THEN 1
                    ELSE signup_rate_limits.attempts + 1
                END,
                last_attempt = EXCLUDED.last_attempt,
                blocked_until = CASE
                    WHEN signup_rate_limits.blocked_until <= EXCLUDED.last_attempt THEN NULL
                    ELSE signup_rate_limits.blocked_until
                END
            RETURNING attempts
            "#,
        )
        .bind(ip)
        .bind(now)
        .bind(cutoff)
        .fetch_one(pool)
        .await?;

        Ok(attempts.max(0) as u32)
    }

    /// Remove rows idle since before `stale_before` and rows whose block has expired
    pub async fn cleanup_rate_limits(
        pool: &PgPool,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let stale = sqlx::query(
            r#"
            DELETE FROM signup_rate_limits
            WHERE last_attempt < $1 AND (blocked_until IS NULL OR blocked_until <= $2)
            "#,
        )
        .bind(stale_before)
        .bind(now)
        .execute(pool)
        .await?;

        let expired = sqlx::query(
            "DELETE FROM signup_rate_limits WHERE blocked_until IS NOT NULL AND blocked_until < $1",
        )
        .bind(now)
        .execute(pool)
        .await?;

        Ok(stale.rows_affected() + expired.rows_affected())
    }

    /// Load the settings record
    pub async fn load_settings(pool: &PgPool) -> Result<Option<Settings>, sqlx::Error> {
        let row: Option<Json<Settings>> =
            sqlx::query_scalar("SELECT data FROM signup_settings WHERE id = 1")
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|Json(settings)| settings))
    }

    /// Create or replace the settings record
    pub async fn save_settings(pool: &PgPool, settings: &Settings) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO signup_settings (id, data)
            VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(Json(settings))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Insert the settings record only if none exists yet
    pub async fn seed_settings(pool: &PgPool, settings: &Settings) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO signup_settings (id, data) VALUES (1, $1) ON CONFLICT (id) DO NOTHING",
        )
        .bind(Json(settings))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
