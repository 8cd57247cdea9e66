//! Fingerprint-keyed result cache with TTL expiry and LRU eviction.
//!
//! Expiry is always checked before recency: an expired entry is dropped on
//! sight and never competes for an LRU slot.

mod fingerprint;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::debug;

use crate::{pipeline::AnalysisResult, sync, CacheConfig};

pub use fingerprint::{compute_fingerprint, Fingerprint};

struct CacheEntry {
    result: AnalysisResult,
    created_at: Instant,
    /// Logical access clock; larger is more recent.
    last_access: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
struct CacheSettings {
    size_limit: usize,
    ttl: Option<Duration>,
}

impl CacheSettings {
    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.created_at) > ttl)
    }
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
    pub evictions: u64,
    pub expirations: u64,
}

/// Concurrent readers share the map's read lock; the access clock and
/// counters are atomics so a hit never needs the write lock.
pub struct AnalysisCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    settings: RwLock<CacheSettings>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl AnalysisCache {
    /// A `size_limit` of zero disables storage; `None` TTL disables expiry.
    pub fn new(size_limit: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            settings: RwLock::new(CacheSettings { size_limit, ttl }),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.size_limit, config.ttl())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<AnalysisResult> {
        let settings = *sync::read(&self.settings);
        let now = Instant::now();
        {
            let entries = sync::read(&self.entries);
            match entries.get(fingerprint) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if !settings.is_expired(entry, now) => {
                    entry.last_access.store(self.tick(), Ordering::Relaxed);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.result.clone());
                }
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent put may have
        // refreshed it.
        let mut entries = sync::write(&self.entries);
        if let Some(entry) = entries.get(fingerprint) {
            if !settings.is_expired(entry, now) {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.result.clone());
            }
            entries.remove(fingerprint);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint, "cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, fingerprint: Fingerprint, result: AnalysisResult) {
        let settings = *sync::read(&self.settings);
        if settings.size_limit == 0 {
            return;
        }

        let entry = CacheEntry {
            result,
            created_at: Instant::now(),
            last_access: AtomicU64::new(self.tick()),
        };
        let mut entries = sync::write(&self.entries);
        entries.insert(fingerprint, entry);
        if entries.len() > settings.size_limit {
            self.shrink(&mut entries, settings);
        }
    }

    /// Drops expired entries, then least-recently-accessed ones until the
    /// size limit holds.
    fn shrink(&self, entries: &mut HashMap<Fingerprint, CacheEntry>, settings: CacheSettings) {
        self.remove_expired(entries, settings);

        let excess = entries.len().saturating_sub(settings.size_limit);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(u64, Fingerprint)> = entries
            .iter()
            .map(|(key, entry)| (entry.last_access.load(Ordering::Relaxed), *key))
            .collect();
        by_age.sort_unstable_by_key(|(access, _)| *access);

        for (_, key) in by_age.into_iter().take(excess) {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %key, "evicted least recently used cache entry");
        }
    }

    fn remove_expired(
        &self,
        entries: &mut HashMap<Fingerprint, CacheEntry>,
        settings: CacheSettings,
    ) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !settings.is_expired(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    /// Removes every expired entry now rather than on next lookup.
    pub fn purge_expired(&self) -> usize {
        let settings = *sync::read(&self.settings);
        let mut entries = sync::write(&self.entries);
        self.remove_expired(&mut entries, settings)
    }

    /// Empties the cache and zeroes every counter.
    pub fn clear(&self) {
        sync::write(&self.entries).clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    /// Takes effect on the next lookup or insertion; nothing is evicted
    /// here.
    pub fn set_parameters(&self, size_limit: usize, ttl: Option<Duration>) {
        *sync::write(&self.settings) = CacheSettings { size_limit, ttl };
    }

    pub fn size_limit(&self) -> usize {
        sync::read(&self.settings).size_limit
    }

    pub fn ttl(&self) -> Option<Duration> {
        sync::read(&self.settings).ttl
    }

    pub fn len(&self) -> usize {
        sync::read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        sync::read(&self.entries).contains_key(fingerprint)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// `hits / (hits + misses)`, or 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits(),
            misses: self.misses(),
            hit_rate: self.hit_rate(),
            entries: self.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("settings", &*sync::read(&self.settings))
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, thread};

    use super::*;
    use crate::AudioBuffer;

    fn key(seed: f32) -> Fingerprint {
        let buffer = AudioBuffer::from_interleaved(vec![seed; 8], 8_000, 1);
        compute_fingerprint(&buffer, &["dynamics"], &BTreeMap::new())
    }

    fn result(sample_rate: u32) -> AnalysisResult {
        AnalysisResult {
            sample_rate,
            ..Default::default()
        }
    }

    #[test]
    fn put_then_get_returns_stored_result() {
        let cache = AnalysisCache::new(4, None);
        assert_eq!(cache.hit_rate(), 0.0);
        assert!(cache.get(&key(0.1)).is_none());

        cache.put(key(0.1), result(44_100));
        assert_eq!(cache.get(&key(0.1)), Some(result(44_100)));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hit_rate(), 0.5);
    }

    #[test]
    fn expired_entries_miss_and_are_removed() {
        let cache = AnalysisCache::new(4, Some(Duration::from_millis(20)));
        cache.put(key(0.2), result(8_000));
        assert!(cache.get(&key(0.2)).is_some());

        thread::sleep(Duration::from_millis(40));
        assert!(cache.get(&key(0.2)).is_none());
        assert_eq!(cache.misses(), 1);
        assert!(!cache.contains(&key(0.2)));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn eviction_removes_least_recently_accessed() {
        let cache = AnalysisCache::new(3, None);
        for seed in [0.1, 0.2, 0.3] {
            cache.put(key(seed), result(8_000));
        }
        // Touch the oldest so the second insert becomes the victim.
        assert!(cache.get(&key(0.1)).is_some());

        cache.put(key(0.4), result(8_000));
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&key(0.1)));
        assert!(!cache.contains(&key(0.2)));
        assert!(cache.contains(&key(0.4)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entries_go_before_lru_victims() {
        let cache = AnalysisCache::new(2, Some(Duration::from_millis(20)));
        cache.put(key(0.1), result(8_000));
        thread::sleep(Duration::from_millis(40));
        cache.set_parameters(2, Some(Duration::from_millis(30)));
        cache.put(key(0.2), result(8_000));
        cache.put(key(0.3), result(8_000));

        assert!(!cache.contains(&key(0.1)));
        assert!(cache.contains(&key(0.2)));
        assert!(cache.contains(&key(0.3)));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn shrinking_limit_applies_on_next_insert() {
        let cache = AnalysisCache::new(4, None);
        for seed in [0.1, 0.2, 0.3, 0.4] {
            cache.put(key(seed), result(8_000));
        }
        cache.set_parameters(2, None);
        assert_eq!(cache.len(), 4);

        cache.put(key(0.5), result(8_000));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(0.5)));
        assert!(cache.contains(&key(0.4)));
    }

    #[test]
    fn clear_resets_counters() {
        let cache = AnalysisCache::new(4, None);
        cache.put(key(0.1), result(8_000));
        cache.get(&key(0.1));
        cache.get(&key(0.9));
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn zero_limit_stores_nothing() {
        let cache = AnalysisCache::new(0, None);
        cache.put(key(0.1), result(8_000));
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_expired_drops_stale_entries() {
        let cache = AnalysisCache::new(4, Some(Duration::from_millis(10)));
        cache.put(key(0.1), result(8_000));
        cache.put(key(0.2), result(8_000));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }
}
