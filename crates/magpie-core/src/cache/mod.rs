//! Thread-safe LRU cache with per-entry TTL.
//!
//! Bounded by entry count and by an approximate byte budget; callers supply
//! the byte cost of each entry at insert time. Hit/miss/eviction counters
//! are kept for the `registry stats` command.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Configuration and stats
// ---------------------------------------------------------------------------

/// Capacity bounds and default TTL.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 128,
            max_bytes: 50 * 1024 * 1024,
            default_ttl: Duration::from_secs(300),
        }
    }
}

/// Counters accumulated over the cache's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub bytes: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, 0.0 when none were made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct Entry<V> {
    value: V,
    cost: usize,
    expires_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Keys from least to most recently used.
    order: Vec<K>,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// LRU cache with TTL expiry. All methods take `&self`; the interior
/// mutex makes the cache shareable behind an `Arc`.
pub struct LruCache<K, V> {
    config: CacheConfig,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
        }
    }

    /// Look up a key, refreshing its recency. Expired entries are removed
    /// and counted as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();

        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let value = entry.value.clone();
                inner.hits += 1;
                Self::touch(&mut inner.order, key);
                Some(value)
            }
            Some(_) => {
                Self::remove_entry(&mut inner, key);
                inner.expirations += 1;
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert with the default TTL. `cost` is the entry's byte charge
    /// against the cache budget.
    pub fn insert(&self, key: K, value: V, cost: usize) {
        self.insert_with_ttl(key, value, cost, self.config.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, cost: usize, ttl: Duration) {
        let mut inner = self.lock();

        Self::remove_entry(&mut inner, &key);
        inner.entries.insert(
            key.clone(),
            Entry {
                value,
                cost,
                expires_at: Instant::now() + ttl,
            },
        );
        inner.order.push(key);
        inner.bytes += cost;

        while inner.entries.len() > self.config.max_entries
            || inner.bytes > self.config.max_bytes
        {
            let Some(oldest) = inner.order.first().cloned() else {
                break;
            };
            Self::remove_entry(&mut inner, &oldest);
            inner.evictions += 1;
        }
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.lock();
        Self::remove_entry(&mut inner, key)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters and current occupancy.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            entries: inner.entries.len(),
            bytes: inner.bytes,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<K, V>> {
        // Entries and counters stay consistent even if a panic poisoned
        // the lock, so keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn touch(order: &mut Vec<K>, key: &K) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            let k = order.remove(pos);
            order.push(k);
        }
    }

    fn remove_entry(inner: &mut Inner<K, V>, key: &K) -> bool {
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.bytes = inner.bytes.saturating_sub(entry.cost);
                if let Some(pos) = inner.order.iter().position(|k| k == key) {
                    inner.order.remove(pos);
                }
                true
            }
            None => false,
        }
    }
}
