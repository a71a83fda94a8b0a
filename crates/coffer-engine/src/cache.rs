//! Cache-aside helper
//!
//! [`TtlCache`] is a bounded LRU whose entries also expire. [`cache_aside`] wraps a
//! loader: return the cached value if fresh, otherwise load, store and return.
//! Callers invalidate explicitly after writes.

use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;

pub struct TtlCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, (V, Instant)>,
    /// Bumped by every invalidation. A load that started before an invalidation
    /// must not store what it read.
    generation: u64,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh value for `key`; expired entries are dropped on the way.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let now = Instant::now();
        let cached = inner
            .entries
            .get(key)
            .map(|(value, expires_at)| (*expires_at > now).then(|| value.clone()));
        match cached {
            Some(Some(value)) => Some(value),
            Some(None) => {
                inner.entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        self.lock().entries.put(key, (value, Instant::now() + ttl));
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Insert only if nothing was invalidated since `generation` was read.
    pub fn insert_if_current(&self, key: K, value: V, ttl: Duration, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.entries.put(key, (value, Instant::now() + ttl));
        true
    }

    pub fn invalidate(&self, key: &K) {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.entries.pop(key);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Return the cached value for `key`, or run `loader` and cache its `Ok` result for `ttl`.
/// Errors are never cached. A zero `ttl` bypasses the cache. A result whose load
/// overlapped an invalidation is returned but not cached.
pub async fn cache_aside<K, V, E, F, Fut>(
    cache: &TtlCache<K, V>,
    key: K,
    ttl: Duration,
    loader: F,
) -> Result<V, E>
where
    K: Hash + Eq,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    if ttl.is_zero() {
        return loader().await;
    }
    if let Some(hit) = cache.get(&key) {
        return Ok(hit);
    }
    let generation = cache.generation();
    let value = loader().await?;
    cache.insert_if_current(key, value.clone(), ttl, generation);
    Ok(value)
}
