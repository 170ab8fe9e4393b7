//! Parse-response cache.
//!
//! The same card is often scanned more than once (re-shots, batch retries
//! driven by the caller). Caching the AI candidate keyed by the exact
//! (text, hints) pair keeps repeat parses off the remote quota.
//!
//! Uses the moka crate for thread-safe, async-compatible LRU caching with
//! TTL support.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use cardscan_core::{AiConfig, ParseHints, ParsedCandidate};

/// Cache for AI parse responses.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Cache<u64, ParsedCandidate>,
    stats: Arc<CacheStats>,
}

impl ResponseCache {
    /// Build from the AI configuration's cache settings
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .build(),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Cache key over the exact parse request
    pub fn key(text: &str, hints: Option<&ParseHints>) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        if let Some(hints) = hints {
            hints.language.hash(&mut hasher);
            hints.country.hash(&mut hasher);
            hints.card_type.hash(&mut hasher);
            hints.industry.hash(&mut hasher);
        }
        hasher.finish()
    }

    pub async fn get(&self, key: u64) -> Option<ParsedCandidate> {
        let hit = self.cache.get(&key).await;
        if hit.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub async fn insert(&self, key: u64, candidate: ParsedCandidate) {
        self.cache.insert(key, candidate).await;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Hit/miss counters for the response cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}
