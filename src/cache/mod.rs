//! Bounded LRU loading caches shared by concurrent readers.
//!
//! Both query-path caches (series metadata and chunk data) are instances of
//! [`LoadingCache`]: a bounded key-to-entry store with least-recently-used
//! eviction and singleflight loading. Entries are content-derived from
//! immutable closed resources, so a cached entry never changes once
//! inserted; only eviction or explicit per-resource invalidation removes it.
//!
//! The cache is an explicitly constructed, injectable object whose lifecycle
//! is tied to the storage-engine instance, not ambient process state.

pub mod chunk;
pub mod metadata;

pub use chunk::ChunkCache;
pub use metadata::SeriesMetadataCache;

use crate::error::{CoreError, Result};
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default capacity when none is configured: 1024 entries.
pub const DEFAULT_CACHE_ENTRIES: usize = 1024;

/// Capacity budget for a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCapacity {
    /// Bound by entry count.
    Entries(usize),
    /// Bound by total entry weight in bytes.
    Bytes(usize),
}

/// Configuration for a loading cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity budget. Default: 1024 entries.
    pub capacity: CacheCapacity,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: CacheCapacity::Entries(DEFAULT_CACHE_ENTRIES),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with a custom capacity.
    pub fn with_capacity(mut self, capacity: CacheCapacity) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Byte weight of one cache entry, used under [`CacheCapacity::Bytes`].
pub trait EntryWeight {
    /// Approximate resident size of the entry in bytes.
    fn weight(&self) -> usize;
}

/// Counters for a loading cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Number of lookups served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that did not find a cached entry.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of loader invocations.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of loader invocations that failed.
    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }

    /// Number of entries evicted to stay within budget.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
}

struct CachedEntry<V> {
    value: Arc<V>,
    weight: usize,
}

/// Result slot shared between the caller running a load and the callers
/// waiting for it. Loader errors are not `Clone`, so waiters receive the
/// rendered message.
struct LoadSlot<V> {
    result: Mutex<Option<std::result::Result<Arc<V>, String>>>,
    cond: Condvar,
}

impl<V> LoadSlot<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            cond: Condvar::new(),
        }
    }
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, CachedEntry<V>>,
    total_weight: usize,
    in_flight: HashMap<K, Arc<LoadSlot<V>>>,
}

/// Bounded key-to-entry store with LRU eviction and singleflight loading.
///
/// `get_or_load` guarantees at most one in-flight load per key: concurrent
/// callers for the same missing key block until the first caller's load
/// completes and then share its result. Loader failures are never cached;
/// the slot is removed so a later call retries the load.
pub struct LoadingCache<K: Hash + Eq + Clone, V: EntryWeight> {
    inner: Mutex<Inner<K, V>>,
    config: CacheConfig,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V: EntryWeight> LoadingCache<K, V> {
    /// Creates a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_weight: 0,
                in_flight: HashMap::new(),
            }),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Returns the cached entry for `key`, loading it with `loader` on a
    /// miss.
    ///
    /// # Errors
    ///
    /// The caller whose load fails receives the loader's error; concurrent
    /// callers waiting on that load receive [`CoreError::SharedLoadFailed`].
    /// Neither outcome is cached.
    pub fn get_or_load<F>(&self, key: K, loader: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.entries.get(&key) {
                self.stats.record_hit();
                return Ok(entry.value.clone());
            }
            self.stats.record_miss();

            if let Some(slot) = inner.in_flight.get(&key) {
                let slot = slot.clone();
                drop(inner);
                let mut result = slot.result.lock();
                while result.is_none() {
                    slot.cond.wait(&mut result);
                }
                return match result.as_ref() {
                    Some(Ok(value)) => Ok(value.clone()),
                    Some(Err(message)) => Err(CoreError::SharedLoadFailed {
                        message: message.clone(),
                    }),
                    None => unreachable!("load slot signaled without a result"),
                };
            }

            inner.in_flight.insert(key.clone(), Arc::new(LoadSlot::new()));
        }

        // This caller owns the in-flight slot; run the load unlocked.
        let loaded = loader();
        self.stats.record_load();

        let mut inner = self.inner.lock();
        // Only the owning caller removes the slot, so it is still present.
        let slot = inner.in_flight.remove(&key).unwrap();

        match loaded {
            Ok(value) => {
                let value = Arc::new(value);
                let weight = self.entry_weight(&value);
                inner.entries.put(
                    key,
                    CachedEntry {
                        value: value.clone(),
                        weight,
                    },
                );
                inner.total_weight += weight;
                self.evict_over_budget(&mut inner);
                drop(inner);

                *slot.result.lock() = Some(Ok(value.clone()));
                slot.cond.notify_all();
                Ok(value)
            }
            Err(err) => {
                self.stats.record_load_failure();
                warn!(error = %err, "cache load failed; entry not cached");
                drop(inner);

                *slot.result.lock() = Some(Err(err.to_string()));
                slot.cond.notify_all();
                Err(err)
            }
        }
    }

    /// Removes every entry whose key matches the predicate. Returns the
    /// number of entries removed.
    pub fn invalidate_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut inner = self.inner.lock();
        let matching: Vec<K> = inner
            .entries
            .iter()
            .filter(|(key, _)| pred(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            if let Some(entry) = inner.entries.pop(key) {
                inner.total_weight -= entry.weight;
            }
        }
        if !matching.is_empty() {
            debug!(removed = matching.len(), "invalidated cache entries");
        }
        matching.len()
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cache counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn budget(&self) -> usize {
        match self.config.capacity {
            CacheCapacity::Entries(n) => n,
            CacheCapacity::Bytes(n) => n,
        }
    }

    fn entry_weight(&self, value: &V) -> usize {
        match self.config.capacity {
            CacheCapacity::Entries(_) => 1,
            CacheCapacity::Bytes(_) => value.weight(),
        }
    }

    /// Evicts least-recently-used entries until within budget. A single
    /// entry larger than the whole budget stays resident.
    fn evict_over_budget(&self, inner: &mut Inner<K, V>) {
        let budget = self.budget();
        while inner.total_weight > budget && inner.entries.len() > 1 {
            if let Some((_, entry)) = inner.entries.pop_lru() {
                inner.total_weight -= entry.weight;
                self.stats.record_eviction();
                debug!(weight = entry.weight, "evicted LRU cache entry");
            } else {
                break;
            }
        }
    }
}
