use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::time;
use tracing::{debug, warn};

use super::{CacheEntry, CacheStats};
use crate::clock::{deadline, SharedClock};
use crate::config::CacheConfig;
use crate::error::{Result, StoreError};
use crate::types::{Identity, Record};

type Slot<V> = Arc<OnceCell<V>>;

/// Bounded TTL cache with single-flight computation.
pub struct Cache<V> {
    name: String,
    default_ttl: Duration,
    clock: SharedClock,
    state: Mutex<CacheState<V>>,
}

struct CacheState<V> {
    entries: LruCache<Identity, CacheEntry<V>>,
    in_flight: HashMap<Identity, Slot<V>>,
    stats: CacheStats,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, config: &CacheConfig, clock: SharedClock) -> Self {
        let entries = match config.capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };

        Self {
            name: name.into(),
            default_ttl: config.default_ttl(),
            clock,
            state: Mutex::new(CacheState {
                entries,
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the live value for `key`, or runs `compute` and caches its
    /// result for `ttl` (the cache default when `None`).
    ///
    /// Concurrent callers for one key share a single computation. A caller
    /// whose `timeout` elapses gets [`StoreError::Timeout`] and gives up its
    /// claim on the computation, so a waiting or later caller retries. A
    /// failed computation is never cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: Identity,
        compute: F,
        ttl: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: fmt::Display,
    {
        let slot = {
            let mut state = self.state.lock();
            if let Some(value) = state.lookup(&key, self.clock.now()) {
                state.stats.hits += 1;
                return Ok(value);
            }
            state.stats.misses += 1;
            Arc::clone(
                state
                    .in_flight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let started = Instant::now();
        let (key_ref, slot_ref) = (&key, &slot);
        let init = slot.get_or_try_init(|| async move {
            let value = compute().await.map_err(|e| StoreError::Compute {
                key: key_ref.clone(),
                reason: e.to_string(),
            })?;
            self.complete(key_ref, slot_ref, value.clone(), ttl);
            Ok::<V, StoreError>(value)
        });

        let outcome = match timeout {
            Some(limit) => match time::timeout(limit, init).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.release(&key, &slot);
                    let elapsed_ms = started.elapsed().as_millis();
                    warn!(
                        cache = %self.name,
                        key = %key,
                        elapsed_ms = elapsed_ms as u64,
                        "cache computation timed out"
                    );
                    return Err(StoreError::Timeout {
                        key: key.clone(),
                        elapsed_ms,
                    });
                }
            },
            None => init.await,
        };

        match outcome {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                self.release(&key, &slot);
                debug!(cache = %self.name, key = %key, error = %e, "cache computation failed");
                Err(e)
            }
        }
    }

    /// Live value for `key`, refreshing its recency.
    pub fn get(&self, key: &Identity) -> Option<V> {
        let mut state = self.state.lock();
        let found = state.lookup(key, self.clock.now());
        if found.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        found
    }

    pub fn insert(&self, key: Identity, value: V, ttl: Option<Duration>) {
        let now = self.clock.now();
        let entry = CacheEntry::new(value, now, deadline(now, ttl.unwrap_or(self.default_ttl)));
        self.state.lock().store(key, entry);
    }

    /// Drops the entry and detaches any computation in flight for `key`,
    /// whose result will then not be cached.
    pub fn invalidate(&self, key: &Identity) -> bool {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        state.entries.pop(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.in_flight.clear();
        state.stats = CacheStats::default();
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let expired: Vec<Identity> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.pop(key);
        }
        state.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    fn complete(&self, key: &Identity, slot: &Slot<V>, value: V, ttl: Option<Duration>) {
        let mut state = self.state.lock();
        state.stats.computations += 1;

        let owns_slot = state
            .in_flight
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, slot));
        if !owns_slot {
            debug!(cache = %self.name, key = %key, "key invalidated during computation");
            return;
        }

        state.in_flight.remove(key);
        let now = self.clock.now();
        let expires_at = deadline(now, ttl.unwrap_or(self.default_ttl));
        state.store(key.clone(), CacheEntry::new(value, now, expires_at));
    }

    /// Forgets an unfinished slot once nobody else is waiting on it.
    fn release(&self, key: &Identity, slot: &Slot<V>) {
        let mut state = self.state.lock();
        let idle = state.in_flight.get(key).map_or(false, |current| {
            Arc::ptr_eq(current, slot) && Arc::strong_count(slot) <= 2 && !slot.initialized()
        });
        if idle {
            state.in_flight.remove(key);
        }
    }
}

impl<V: Clone> CacheState<V> {
    fn lookup(&mut self, key: &Identity, now: chrono::DateTime<chrono::Utc>) -> Option<V> {
        let entry = self.entries.get_mut(key)?;
        if !entry.is_expired(now) {
            entry.touch(now);
            return Some(entry.value().clone());
        }
        self.entries.pop(key);
        self.stats.expirations += 1;
        None
    }

    fn store(&mut self, key: Identity, entry: CacheEntry<V>) {
        if let Some((displaced, _)) = self.entries.push(key.clone(), entry) {
            if displaced != key {
                self.stats.evictions += 1;
            }
        }
    }
}

/// Named caches of records, one per cache name.
pub struct CacheManager {
    config: CacheConfig,
    clock: SharedClock,
    caches: RwLock<HashMap<String, Arc<Cache<Record>>>>,
}

impl CacheManager {
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            caches: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The cache called `name`, created on first use.
    pub fn cache(&self, name: &str) -> Arc<Cache<Record>> {
        if let Some(cache) = self.caches.read().get(name) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write();
        Arc::clone(caches.entry(name.to_string()).or_insert_with(|| {
            debug!(cache = name, "created cache");
            Arc::new(Cache::new(name, &self.config, Arc::clone(&self.clock)))
        }))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Cache<Record>>> {
        self.caches.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Expiry pass over every cache.
    pub fn purge_expired(&self) -> usize {
        let caches: Vec<_> = self.caches.read().values().cloned().collect();
        caches.iter().map(|cache| cache.purge_expired()).sum()
    }

    pub fn clear(&self) {
        for cache in self.caches.read().values() {
            cache.clear();
        }
    }
}
