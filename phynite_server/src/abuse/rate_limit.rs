//! Rate limiting for abuse prevention
//!
//! Per-IP attempt counter over a one-minute window. Reaching the threshold
//! blocks the IP for five minutes. Counts live in PostgreSQL when a database
//! is configured, otherwise in process memory.

use crate::db::{self, RateLimitRecord, StoreError};
use chrono::{DateTime, Duration, Utc};
use phynite_common::constants::{DEFAULT_RATE_LIMIT, MAX_RATE_LIMIT, MIN_RATE_LIMIT};
use sqlx::PgPool;
use std::sync::Arc;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Attempts allowed per window
    pub max_attempts: u32,
    /// Counting window
    pub window: Duration,
    /// How long an IP stays blocked after reaching the threshold
    pub block_duration: Duration,
}

impl RateLimitConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.clamp(MIN_RATE_LIMIT, MAX_RATE_LIMIT),
            window: Duration::minutes(1),
            block_duration: Duration::minutes(5),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT)
    }
}

/// How long idle rows are kept by an explicit cleanup
pub const RETENTION_HOURS: i64 = 24;

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the attempt is admitted
    pub allowed: bool,
    /// Attempts counted in the current window, including this one when admitted
    pub current: u32,
    /// Maximum allowed in the window
    pub limit: u32,
    /// End of the active block, when rejected
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitResult {
    /// Seconds until a blocked IP may retry
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.blocked_until
            .map(|until| (until - now).num_seconds().max(1) as u64)
    }
}

/// Where attempt counts are kept
#[derive(Clone)]
pub enum RateLimitStore {
    Local(Arc<local::LocalRateLimitStore>),
    Postgres(PgPool),
}

impl RateLimitStore {
    pub fn local() -> Self {
        RateLimitStore::Local(Arc::new(local::LocalRateLimitStore::new()))
    }

    async fn active_block(&self, ip: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self {
            RateLimitStore::Local(store) => Ok(store.active_block(ip, now)),
            RateLimitStore::Postgres(pool) => Ok(db::queries::active_block(pool, ip, now).await?),
        }
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64, StoreError> {
        match self {
            RateLimitStore::Local(store) => Ok(store.purge_stale(cutoff, now)),
            RateLimitStore::Postgres(pool) => Ok(db::queries::purge_stale(pool, cutoff, now).await?),
        }
    }

    async fn attempts_since(&self, ip: &str, cutoff: DateTime<Utc>) -> Result<u32, StoreError> {
        match self {
            RateLimitStore::Local(store) => Ok(store.attempts_since(ip, cutoff)),
            RateLimitStore::Postgres(pool) => Ok(db::queries::attempts_since(pool, ip, cutoff).await?),
        }
    }

    async fn block(&self, ip: &str, until: DateTime<Utc>) -> Result<(), StoreError> {
        match self {
            RateLimitStore::Local(store) => {
                store.block(ip, until);
                Ok(())
            }
            RateLimitStore::Postgres(pool) => Ok(db::queries::block_ip(pool, ip, until).await?),
        }
    }

    async fn record_attempt(&self, ip: &str, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Result<u32, StoreError> {
        match self {
            RateLimitStore::Local(store) => Ok(store.record_attempt(ip, now, cutoff)),
            RateLimitStore::Postgres(pool) => Ok(db::queries::record_attempt(pool, ip, now, cutoff).await?),
        }
    }

    async fn cleanup(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64, StoreError> {
        match self {
            RateLimitStore::Local(store) => Ok(store.cleanup(stale_before, now)),
            RateLimitStore::Postgres(pool) => {
                Ok(db::queries::cleanup_rate_limits(pool, stale_before, now).await?)
            }
        }
    }
}

/// Per-IP rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
}

impl RateLimiter {
    pub fn new(store: RateLimitStore) -> Self {
        Self { store }
    }

    /// Check and record an attempt from `ip` at `now`
    pub async fn check(
        &self,
        ip: &str,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult, StoreError> {
        if let Some(until) = self.store.active_block(ip, now).await? {
            return Ok(RateLimitResult {
                allowed: false,
                current: config.max_attempts,
                limit: config.max_attempts,
                blocked_until: Some(until),
            });
        }

        let cutoff = now - config.window;
        self.store.purge_stale(cutoff, now).await?;

        let attempts = self.store.attempts_since(ip, cutoff).await?;
        if attempts >= config.max_attempts {
            let until = now + config.block_duration;
            self.store.block(ip, until).await?;
            tracing::warn!(
                event = "rate_limit_exceeded",
                ip = %ip,
                attempts,
                blocked_until = %until,
                "Blocking IP after too many attempts"
            );
            return Ok(RateLimitResult {
                allowed: false,
                current: attempts,
                limit: config.max_attempts,
                blocked_until: Some(until),
            });
        }

        let current = self.store.record_attempt(ip, now, cutoff).await?;
        Ok(RateLimitResult {
            allowed: true,
            current,
            limit: config.max_attempts,
            blocked_until: None,
        })
    }

    /// Admit or reject an attempt from `ip` now
    pub async fn admit(&self, ip: &str, config: &RateLimitConfig) -> Result<bool, StoreError> {
        Ok(self.check(ip, config, Utc::now()).await?.allowed)
    }

    /// Drop rows idle for a day and rows whose block has expired
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let removed = self.store.cleanup(now - Duration::hours(RETENTION_HOURS), now).await?;
        tracing::info!(removed, "Cleaned up rate limit records");
        Ok(removed)
    }
}

/// In-memory store for single-node deployments without a database
pub mod local {
    use super::*;
    use dashmap::DashMap;

    pub struct LocalRateLimitStore {
        records: DashMap<String, RateLimitRecord>,
    }

    impl LocalRateLimitStore {
        pub fn new() -> Self {
            Self {
                records: DashMap::new(),
            }
        }

        pub fn active_block(&self, ip: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
            self.records
                .get(ip)
                .and_then(|record| record.blocked_until)
                .filter(|until| *until > now)
        }

        pub fn purge_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
            let before = self.records.len();
            self.records.retain(|_, record| {
                record.last_attempt >= cutoff || record.blocked_until.is_some_and(|until| until > now)
            });
            before.saturating_sub(self.records.len()) as u64
        }

        pub fn attempts_since(&self, ip: &str, cutoff: DateTime<Utc>) -> u32 {
            self.records
                .get(ip)
                .filter(|record| record.last_attempt > cutoff)
                .map(|record| record.attempts.max(0) as u32)
                .unwrap_or(0)
        }

        pub fn block(&self, ip: &str, until: DateTime<Utc>) {
            if let Some(mut record) = self.records.get_mut(ip) {
                record.blocked_until = Some(until);
            }
        }

        pub fn record_attempt(&self, ip: &str, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> u32 {
            let mut record = self
                .records
                .entry(ip.to_string())
                .or_insert_with(|| RateLimitRecord {
                    ip_address: ip.to_string(),
                    attempts: 0,
                    last_attempt: now,
                    blocked_until: None,
                });

            if record.attempts > 0 && record.last_attempt <= cutoff {
                record.attempts = 0;
            }
            if record.blocked_until.is_some_and(|until| until <= now) {
                record.blocked_until = None;
            }
            record.attempts += 1;
            record.last_attempt = now;
            record.attempts as u32
        }

        pub fn cleanup(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
            let before = self.records.len();
            self.records.retain(|_, record| match record.blocked_until {
                Some(until) => until >= now,
                None => record.last_attempt >= stale_before,
            });
            before.saturating_sub(self.records.len()) as u64
        }

        #[cfg(test)]
        pub fn get(&self, ip: &str) -> Option<RateLimitRecord> {
            self.records.get(ip).map(|record| record.clone())
        }
    }

    impl Default for LocalRateLimitStore {
        fn default() -> Self {
            Self::new()
        }
    }
}
