use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    #[inline]
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

// ---------------------------------------------------------------------------
// AnalyticsCache
// ---------------------------------------------------------------------------

/// TTL memoization in front of the analytics pipeline.
///
/// Concurrent misses on the same key each run their own computation; whichever
/// finishes last overwrites the entry. Failed computations are never stored.
/// Map guards are never held across an `.await`.
pub struct AnalyticsCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> AnalyticsCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fresh cached value for `key`, without touching the hit/miss counters.
    /// An expired entry found here is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                let value = entry.value.clone();
                return Some(value);
            }
        }
        // read guard is released; only drop what is still stale
        self.entries.remove_if(key, |_, e| !e.is_fresh(now));
        None
    }

    /// Returns the cached value if `now - inserted_at < ttl`, otherwise drops
    /// the stale entry, awaits `compute`, stores an `Ok` result and returns
    /// it. Errors pass through untouched and are never stored.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "analytics cache hit");
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "analytics cache miss");

        let value = compute().await?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        Ok(value)
    }

    pub async fn get_or_compute_default<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.get_or_compute(key, self.default_ttl, compute).await
    }

    /// Removes one entry, or every entry when `key` is None.
    /// Returns how many entries were dropped.
    pub fn flush(&self, key: Option<&str>) -> usize {
        match key {
            Some(k) => usize::from(self.entries.remove(k).is_some()),
            None => {
                let n = self.entries.len();
                self.entries.clear();
                n
            }
        }
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
