//! Product list cache

use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

/// How long a fetched product list is served without asking upstream
pub const PRODUCTS_TTL: Duration = Duration::from_secs(3600);

// Cached upstream payload with the time it was fetched
#[derive(Clone)]
struct CacheEntry {
    products: Value,
    created_at: Instant,
}

/// Product lists keyed by upstream base URL
pub struct ProductCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::with_ttl(PRODUCTS_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fresh cached products for `upstream`
    pub fn get(&self, upstream: &str) -> Option<Value> {
        self.get_at(upstream, Instant::now())
    }

    pub fn get_at(&self, upstream: &str, now: Instant) -> Option<Value> {
        let entry = self.entries.get(upstream)?;
        if now.saturating_duration_since(entry.created_at) < self.ttl {
            Some(entry.products.clone())
        } else {
            drop(entry);
            self.entries.remove(upstream);
            None
        }
    }

    pub fn insert(&self, upstream: &str, products: Value) {
        self.insert_at(upstream, products, Instant::now());
    }

    pub fn insert_at(&self, upstream: &str, products: Value, now: Instant) {
        self.entries.insert(
            upstream.to_string(),
            CacheEntry {
                products,
                created_at: now,
            },
        );
    }

    /// Drop every cached list; returns how many were held
    pub fn invalidate(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

impl Default for ProductCache {
    fn default() -> Self {
        Self::new()
    }
}
