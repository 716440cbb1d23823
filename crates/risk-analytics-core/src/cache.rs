//! VaR cache: LRU + TTL, keyed by a content hash of the return series and
//! the confidence level.
//!
//! Grounded on `ml_client::signal_models::SignalModelsClient`'s
//! `cached_at: Instant` / `cache_ttl` TTL check-and-evict pattern, extended
//! with bounded capacity and LRU eviction via the `lru` crate (this
//! workspace's `DashMap`-only caches have no capacity bound). Values cached
//! are portfolio-independent: the stored VaR/CVaR is per unit portfolio
//! value, and callers scale by their own `portfolio_value` on read.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::decimal::Decimal;

/// Content-hash-derived key. A naive `(length, confidence)` key would
/// collide on any two same-length, same-confidence datasets with different
/// values, so this hashes every return's decimal text form instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    content_hash: u64,
    confidence_bucket: u32,
}

impl CacheKey {
    pub fn new(returns: &[Decimal], confidence: f64) -> Self {
        let mut hasher = Sha256::new();
        for r in returns {
            hasher.update(r.to_string().as_bytes());
            hasher.update(b"|");
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        CacheKey {
            content_hash: u64::from_le_bytes(bytes),
            // basis points: stable bucketing of the confidence float
            confidence_bucket: (confidence * 100.0).round() as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub expires_at: Instant,
    pub hit_count: u64,
}

pub struct VarCache<V: Clone> {
    inner: Mutex<LruCache<CacheKey, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> VarCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        VarCache {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// Returns the cached value if present and not past its TTL. A TTL-miss
    /// evicts the stale entry. Local recovery only — never surfaced as a
    /// `RiskError`.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        let expired = match guard.peek(key) {
            Some(entry) => Instant::now() >= entry.expires_at,
            None => return None,
        };
        if expired {
            guard.pop(key);
            return None;
        }
        let entry = guard.get_mut(key)?;
        entry.last_accessed = Instant::now();
        entry.hit_count += 1;
        Some(entry.value.clone())
    }

    /// Upserts a value, evicting least-recently-used if capacity is
    /// exceeded. `lru::LruCache::put` already performs the eviction.
    pub fn set(&self, key: CacheKey, value: V) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            last_accessed: now,
            expires_at: now + self.ttl,
            hit_count: 0,
        };
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        guard.put(key, entry);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().expect("cache mutex poisoned").clear();
    }
}
