use dashmap::DashMap;
use log::debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::metrics;

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_evictions: AtomicU64,
}

/// General-purpose TTL cache shared by SDK components.
///
/// Entries are served only while younger than the configured time-to-live; a stale entry is
/// dropped on read and counted as a miss. Staleness never changes an answer beyond that window.
///
/// ## Features
///
/// - **TTL Support**: Time-based expiration
/// - **Thread-Safe**: Lock-free concurrent access via `DashMap`
/// - **Metrics**: Hit/miss/eviction counters, exported under the cache name
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    counters: CacheCounters,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl,
            counters: CacheCounters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if still fresh.
    pub fn get(&self, key: &K) -> Option<V> {
        let fresh = match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_miss(self.name);
                return None;
            }
        };

        match fresh {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_hit(self.name);
                Some(value)
            }
            None => {
                self.evict_if_stale(key);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_miss(self.name);
                None
            }
        }
    }

    /// Removes `key` only if its entry is still stale; a concurrent re-insert survives.
    fn evict_if_stale(&self, key: &K) -> bool {
        let evicted = self
            .entries
            .remove_if(key, |_, entry| entry.inserted_at.elapsed() >= self.ttl)
            .is_some();
        if evicted {
            self.counters.stale_evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops every entry older than the TTL, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            if entry.inserted_at.elapsed() >= self.ttl {
                removed += 1;
                false
            } else {
                true
            }
        });
        self.counters
            .stale_evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            debug!("Evicted {} stale entries from {} (size: {})", removed, self.name, self.entries.len());
        }
        metrics::set_cache_size(self.name, self.entries.len() as f64);
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics::set_cache_size(self.name, 0.0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheMetricsSnapshot {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            cache_size: self.entries.len(),
            stale_evictions: self.counters.stale_evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub cache_size: usize,
    pub stale_evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss_counters() {
        let cache: TtlCache<u32, &str> = TtlCache::new("test", Duration::from_secs(60));
        assert_eq!(cache.get(&1), None);
        cache.insert(1, "one");
        assert_eq!(cache.get(&1), Some("one"));

        let snapshot = cache.metrics();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.cache_size, 1);
        assert!((snapshot.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_ttl_never_serves() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::ZERO);
        cache.insert(7, 49);
        assert_eq!(cache.get(&7), None);
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().stale_evictions, 1);
    }

    #[test]
    fn test_stale_eviction_spares_fresh_entry() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.insert(3, 9);
        // entry was refreshed after the stale read decided to evict
        assert!(!cache.evict_if_stale(&3));
        assert_eq!(cache.get(&3), Some(9));
        assert_eq!(cache.metrics().stale_evictions, 0);

        let expiring: TtlCache<u32, u32> = TtlCache::new("test", Duration::ZERO);
        expiring.insert(3, 9);
        assert!(expiring.evict_if_stale(&3));
        assert!(!expiring.evict_if_stale(&3));
        assert_eq!(expiring.metrics().stale_evictions, 1);
    }

    #[test]
    fn test_purge_and_clear() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::ZERO);
        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.purge_expired(), 2);

        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.insert(1, 1);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
