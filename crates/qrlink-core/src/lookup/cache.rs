//! In-memory cache for remote lookups.
//!
//! Entries expire after a TTL, are invalidated when the remote state version
//! moves past the one they were fetched at, and are evicted oldest-first once
//! the entry limit is reached.

use crate::config::CacheDefaults;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// A cached value with its freshness metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub cached_at: Instant,
    /// Remote state version the value was read at.
    pub state_version: u64,
    pub last_validated: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

/// TTL and state-version aware cache owned by one component.
pub struct LookupCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> Default for LookupCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(CacheDefaults::TTL, CacheDefaults::MAX_ENTRIES)
    }
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fresh value for `key`, if any. Expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let expired = match inner.entries.get(key) {
            Some(entry) if now.duration_since(entry.cached_at) < self.ttl => {
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
            inner.stats.expirations += 1;
        }
        inner.stats.misses += 1;
        None
    }

    /// Full entry for `key` regardless of freshness.
    pub fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.lock().entries.get(key).cloned()
    }

    /// Store `value` read at `state_version`, evicting the oldest entry when full.
    pub fn insert(&self, key: K, value: V, state_version: u64) {
        let now = Instant::now();
        let mut inner = self.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
            }
        }
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: now,
                state_version,
                last_validated: now,
            },
        );
    }

    /// Record that `key` was confirmed current at `state_version`.
    pub fn mark_validated(&self, key: &K, state_version: u64) {
        if let Some(entry) = self.lock().entries.get_mut(key) {
            entry.state_version = entry.state_version.max(state_version);
            entry.last_validated = Instant::now();
        }
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Drop every entry read before `state_version`. Returns how many were dropped.
    pub fn observe_state_version(&self, state_version: u64) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.state_version >= state_version);
        let dropped = before - inner.entries.len();
        if dropped > 0 {
            debug!("State version {} invalidated {} cache entries", state_version, dropped);
        }
        dropped
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.duration_since(entry.cached_at) < ttl);
        let removed = before - inner.entries.len();
        inner.stats.expirations += removed as u64;
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Sweep on a fixed interval until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(strong) = cache.upgrade() else { break };
                let removed = strong.sweep();
                if removed > 0 {
                    debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        })
    }
}
