//! The bounded, frequency-aware storage layer (§4.D).
//!
//! Backed by `moka::sync::Cache`, whose default eviction policy is a
//! Window-TinyLFU variant — hot keys survive bursts of cold one-off inserts
//! instead of a plain LRU getting thrashed. TTL is tracked per entry rather
//! than via moka's global `time_to_live`, since each `Set` call carries its
//! own TTL (refresh and webhook-driven upserts may use different values).

use crate::model::Flag;
use moka::sync::Cache as MokaCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    flag: Flag,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// A point-in-time metrics snapshot (§4.D, §4.I).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct StorageStats {
    pub keys_added: u64,
    pub keys_evicted: u64,
    pub hit_ratio: f64,
    pub size: u64,
}

pub struct Storage {
    cache: MokaCache<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    keys_added: AtomicU64,
    keys_evicted: Arc<AtomicU64>,
}

impl Storage {
    /// `max_capacity` bounds the cost of the store; eviction below that
    /// bound follows moka's TinyLFU-style admission policy.
    pub fn new(max_capacity: u64) -> Self {
        let keys_evicted = Arc::new(AtomicU64::new(0));
        let evicted_counter = keys_evicted.clone();
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .eviction_listener(move |_key, _value, _cause| {
                evicted_counter.fetch_add(1, Ordering::Relaxed);
            })
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            keys_added: AtomicU64::new(0),
            keys_evicted,
        }
    }

    /// A flag whose TTL has elapsed behaves as absent (§4.D); it is removed
    /// on the way out so subsequent calls don't keep paying the expiry check.
    pub fn get(&self, key: &str) -> Option<Flag> {
        match self.cache.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::cache_hit();
                Some(entry.flag)
            }
            Some(_) => {
                self.cache.invalidate(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::cache_miss();
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::cache_miss();
                None
            }
        }
    }

    /// Atomic from the caller's perspective: a reader sees the old flag or
    /// the new one, never a torn state (§5 ordering guarantees).
    pub fn set(&self, key: impl Into<String>, flag: Flag, ttl: Duration) {
        self.keys_added.fetch_add(1, Ordering::Relaxed);
        self.cache.insert(
            key.into(),
            Entry {
                flag,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Snapshot every non-expired entry, for the disk mirror writer.
    pub fn snapshot(&self) -> Vec<Flag> {
        self.cache.run_pending_tasks();
        self.cache
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(_, entry)| entry.flag.clone())
            .collect()
    }

    pub fn stats(&self) -> StorageStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_ratio = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
        StorageStats {
            keys_added: self.keys_added.load(Ordering::Relaxed),
            keys_evicted: self.keys_evicted.load(Ordering::Relaxed),
            hit_ratio,
            size: self.cache.entry_count(),
        }
    }
}
