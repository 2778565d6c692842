//! Shared TTL cache.
//!
//! [`CacheStore`] is the only mutable state shared between concurrent
//! engine calls. Entries are replaced whole under one coarse lock and never
//! mutated in place.
//!
//! - expiry is checked lazily on read and by a full sweep on every write
//! - above `max_entries` the oldest quarter (by creation time, then write
//!   order) is evicted
//! - time comes from [`tokio::time::Instant`], so paused-clock tests can
//!   drive expiry

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use calmux_core::{CalendarEvent, CalendarSource};

/// Default entry ceiling.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// What the engine keeps in its shared cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum CachedValue {
    Sources(Vec<CalendarSource>),
    Events(Vec<CalendarEvent>),
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    /// Write order; breaks `created_at` ties.
    seq: u64,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            seq,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Diagnostics snapshot of a cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently held, expired or not.
    pub total_entries: usize,
    /// Entries past their TTL that no read or write has evicted yet.
    pub expired_entries: usize,
    /// Serialized size of every held value, in bytes.
    pub approx_bytes: usize,
    /// Not tracked; always zero.
    pub hit_rate: f64,
}

/// A keyed TTL cache safe to share between tasks.
#[derive(Debug)]
pub struct CacheStore<V> {
    max_entries: usize,
    next_seq: AtomicU64,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl<V: Clone> CacheStore<V> {
    /// Creates an empty cache holding at most about `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            next_seq: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value under `key` unless it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(key) {
            None => {
                trace!(key = %key, "Cache miss");
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                trace!(key = %key, "Cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }
        entries.remove(key);
        trace!(key = %key, "Cache entry expired on read");
        None
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// A zero TTL stores nothing.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        if ttl.is_zero() {
            debug!(key = %key, "Skipping cache write with zero TTL");
            return;
        }

        let mut entries = self.lock();
        Self::sweep(&mut entries, Instant::now());
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(key.clone(), CacheEntry::new(value, ttl, seq));
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Stored cache entry");

        if entries.len() > self.max_entries {
            Self::evict_oldest(&mut entries);
        }
    }

    /// Removes one entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            debug!(key = %key, "Removed cache entry");
        }
        removed
    }

    /// Removes every entry whose key contains `pattern`.
    pub fn invalidate_by_substring(&self, pattern: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(pattern = %pattern, removed, "Invalidated cache entries");
        }
        removed
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        debug!(count, "Cleared all cache entries");
    }

    /// Number of held entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns every held key.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn sweep(entries: &mut HashMap<String, CacheEntry<V>>, now: Instant) {
        let before = entries.len();
        entries.retain(|key, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                trace!(key = %key, "Evicting expired cache entry");
            }
            keep
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired cache entries");
        }
    }

    fn evict_oldest(entries: &mut HashMap<String, CacheEntry<V>>) {
        let quota = entries.len().div_ceil(4);
        let mut by_age: Vec<(String, Instant, u64)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.created_at, entry.seq))
            .collect();
        by_age.sort_by_key(|(_, created_at, seq)| (*created_at, *seq));

        for (key, ..) in by_age.into_iter().take(quota) {
            entries.remove(&key);
        }
        debug!(evicted = quota, remaining = entries.len(), "Cache over capacity");
    }
}

impl<V: Clone + Serialize> CacheStore<V> {
    /// Reports entry counts and approximate footprint.
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let now = Instant::now();
        let expired_entries = entries.values().filter(|e| e.is_expired(now)).count();
        let approx_bytes = entries
            .iter()
            .map(|(key, entry)| {
                key.len() + serde_json::to_vec(&entry.value).map_or(0, |bytes| bytes.len())
            })
            .sum();

        CacheStats {
            total_entries: entries.len(),
            expired_entries,
            approx_bytes,
            hit_rate: 0.0,
        }
    }
}
