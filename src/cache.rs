//! Bounded LRU store shared by every connection of one process.
//!
//! One `parking_lot::Mutex` guards the whole map; `get` and `set` hold it for
//! their full duration. Both operations are O(1), so the critical section is
//! short enough that no reader/writer split is needed.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// Default number of entries when no size is configured.
pub const DEFAULT_CACHE_SIZE: usize = 128;

/// Recency-ordered key/value store with a fixed capacity.
///
/// `get` hands out a clone of the stored value. Callers that store
/// reference-counted values (the proxy stores `Arc<Value>`) must deep-copy
/// before mutating.
pub struct LruStore<V> {
    inner: Mutex<LruCache<String, V>>,
    name: &'static str,
}

impl<V: Clone> LruStore<V> {
    /// Create a store. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self::named("default", capacity)
    }

    /// Create a store whose metrics are labelled with `name`.
    pub fn named(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            name,
        }
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        let hit = self.inner.lock().get(key).cloned();
        if hit.is_some() {
            metrics::counter!("calc_relay_cache_hits_total", "cache" => self.name).increment(1);
        } else {
            metrics::counter!("calc_relay_cache_misses_total", "cache" => self.name).increment(1);
        }
        hit
    }

    /// Insert or overwrite `key` as most-recently-used, evicting the single
    /// least-recently-used entry if the store is full.
    pub fn set(&self, key: String, value: V) {
        let mut cache = self.inner.lock();
        let evicts = cache.len() == cache.cap().get() && !cache.contains(&key);
        cache.put(key, value);
        drop(cache);

        if evicts {
            metrics::counter!("calc_relay_cache_evictions_total", "cache" => self.name)
                .increment(1);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}
