//! In-memory response cache keyed by the normalized user message
//!
//! Entries live for a fixed TTL. Nothing is evicted by size; expired entries
//! are dropped when they are next looked up or by [`ResponseCache::cleanup_expired`].

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::config::CacheConfig;

/// Cache entry with TTL support
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

/// A cache hit
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<V> {
    pub value: V,
    pub cached_at: DateTime<Utc>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct ResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Lowercased, trimmed message
pub fn cache_key(message: &str) -> String {
    message.trim().to_lowercase()
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_ttl(Duration::seconds(i64::try_from(config.ttl_secs).unwrap_or(i64::MAX)))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, message: &str) -> Option<CachedValue<V>> {
        self.get_at(message, Utc::now())
    }

    /// Look up as of `now`. An entry older than the TTL is removed and missed.
    pub fn get_at(&self, message: &str, now: DateTime<Utc>) -> Option<CachedValue<V>> {
        let key = cache_key(message);

        let hit = self.entries.get(&key).and_then(|entry| {
            (now - entry.cached_at < self.ttl).then(|| CachedValue {
                value: entry.value.clone(),
                cached_at: entry.cached_at,
            })
        });

        match hit {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Response cache hit for {key:?}");
                Some(value)
            }
            None => {
                // Guard dropped above; removing now cannot deadlock the shard
                self.entries
                    .remove_if(&key, |_, entry| now - entry.cached_at >= self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Response cache miss for {key:?}");
                None
            }
        }
    }

    pub fn put(&self, message: &str, value: V) {
        self.put_at(message, value, Utc::now());
    }

    /// Store unconditionally, replacing any previous entry
    pub fn put_at(&self, message: &str, value: V, now: DateTime<Utc>) {
        self.entries.insert(
            cache_key(message),
            CacheEntry {
                value,
                cached_at: now,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.cached_at < self.ttl);
        before - self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
