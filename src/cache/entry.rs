use chrono::{DateTime, Utc};
use serde::Serialize;

/// A cached value and its timing.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            inserted_at: now,
            last_access: now,
            expires_at,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn inserted_at(&self) -> DateTime<Utc> {
        self.inserted_at
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Live strictly before `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access = now;
    }
}

/// Counters since the cache was created or last cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    /// Entries pushed out by the capacity bound.
    pub evictions: u64,
    /// Entries dropped because their TTL ran out.
    pub expirations: u64,
}
