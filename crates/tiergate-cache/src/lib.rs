//! Tiergate Cache - memoization of store reads.
//!
//! Entries carry a creation timestamp, hit counter, and last-access time.
//! Expiry is lazy on read plus a periodic background sweep; capacity
//! overflow evicts the least-recently-accessed 10% in one pass. Keys are
//! namespaced by kind so one entity's grants can be invalidated across
//! every tier without a global flush.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod keys;
mod sweep;

pub use sweep::spawn_sweeper;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are treated as a miss and purged.
    pub ttl: Duration,
    /// Capacity bound; exceeding it triggers LRU eviction.
    pub max_entries: usize,
    /// Interval of the proactive background sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_entries: 10_000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct CacheEntry {
    data: serde_json::Value,
    created_at: Instant,
    hits: u64,
    last_access: Instant,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_hits: u64,
    /// Age of the oldest live entry.
    pub oldest_age: Duration,
}

/// Shared permission cache.
///
/// Values are stored as JSON payloads and typed back out through serde, so
/// a single cache serves both effective permissions and hierarchy
/// snapshots. All operations take a single internal lock; callers
/// need no external synchronization.
///
/// Fills racing against invalidations use the invalidation epoch: snapshot
/// it before the backing read, then fill with [`Self::set_if_fresh`]. A
/// fill loses to any invalidation that landed in between, so the cache
/// never resurrects a value older than the last invalidation.
pub struct PermissionCache {
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Bumped under the entries lock on every explicit invalidation.
    epoch: AtomicU64,
}

impl PermissionCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current invalidation epoch, for use with [`Self::set_if_fresh`].
    #[must_use]
    pub fn invalidation_epoch(&self) -> u64 {
        // read under the lock so it orders against concurrent invalidations
        let _entries = self.entries.lock();
        self.epoch.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fetch a value, treating expired entries as a miss and purging them.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = entries
            .get(key)
            .is_some_and(|entry| now.duration_since(entry.created_at) > self.config.ttl);
        if expired {
            entries.remove(key);
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.hits += 1;
        entry.last_access = now;
        serde_json::from_value(entry.data.clone()).ok()
    }

    /// Store a value, evicting the least-recently-accessed 10% first when
    /// the cache is at capacity.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        let Ok(data) = serde_json::to_value(value) else {
            return;
        };
        let mut entries = self.entries.lock();
        Self::insert(&mut entries, key.into(), data, self.config.max_entries);
    }

    /// Store a value only if no invalidation has landed since `epoch` was
    /// snapshotted. Returns whether the value was stored.
    ///
    /// This is the fill path for values derived from a backing read: a
    /// mutation that invalidated the key after the read started wins, and
    /// the now-stale fill is discarded.
    pub fn set_if_fresh<T: Serialize>(&self, key: impl Into<String>, value: &T, epoch: u64) -> bool {
        let Ok(data) = serde_json::to_value(value) else {
            return false;
        };
        let mut entries = self.entries.lock();
        if self.epoch.load(Ordering::Relaxed) != epoch {
            trace!("discarding stale cache fill after invalidation");
            return false;
        }
        Self::insert(&mut entries, key.into(), data, self.config.max_entries);
        true
    }

    fn insert(
        entries: &mut HashMap<String, CacheEntry>,
        key: String,
        data: serde_json::Value,
        max_entries: usize,
    ) {
        let now = Instant::now();
        if entries.len() >= max_entries {
            Self::evict_least_used(entries);
        }
        entries.insert(
            key,
            CacheEntry {
                data,
                created_at: now,
                hits: 0,
                last_access: now,
            },
        );
    }

    /// Remove one key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::Relaxed);
        entries.remove(key).is_some()
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::Relaxed);
        entries.clear();
    }

    /// Delete all keys matching the pattern. Returns the number removed.
    pub fn invalidate_matching(&self, pattern: &Regex) -> usize {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::Relaxed);
        let keys: Vec<String> = entries
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        trace!(pattern = %pattern, removed = keys.len(), "invalidated cache keys");
        keys.len()
    }

    /// Invalidate every cached value derived from one entity's grants: the
    /// per-tier permission keys plus the hierarchy snapshot.
    pub fn invalidate_entity(&self, kind: tiergate_core::EntityKind, id: &str) {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::Relaxed);
        for tier in tiergate_core::Tier::ALL {
            entries.remove(&keys::entity_permission(kind, id, tier));
        }
        entries.remove(&keys::hierarchy_snapshot());
    }

    /// Purge expired entries. Called by the background sweep.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.created_at) <= self.config.ttl);
        before - entries.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock();
        let total_hits = entries.values().map(|e| e.hits).sum();
        let oldest_age = entries
            .values()
            .map(|e| now.duration_since(e.created_at))
            .max()
            .unwrap_or_default();
        CacheStats {
            entries: entries.len(),
            total_hits,
            oldest_age,
        }
    }

    /// One-pass eviction of the least-recently-accessed 10% (at least one).
    fn evict_least_used(entries: &mut HashMap<String, CacheEntry>) {
        let mut by_access: Vec<(String, Instant)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_access))
            .collect();
        by_access.sort_by_key(|(_, at)| *at);

        let to_remove = (entries.len() / 10).max(1);
        for (key, _) in by_access.into_iter().take(to_remove) {
            entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(ttl: Duration, max_entries: usize) -> PermissionCache {
        PermissionCache::new(CacheConfig {
            ttl,
            max_entries,
            sweep_interval: Duration::from_secs(60),
        })
    }

    #[test]
    fn get_set_round_trip() {
        let cache = small_cache(Duration::from_secs(60), 100);
        cache.set("k1", &"read_only".to_string());
        assert_eq!(cache.get::<String>("k1").as_deref(), Some("read_only"));
        assert!(cache.get::<String>("missing").is_none());
    }

    #[test]
    fn expired_entries_read_as_miss_and_are_purged() {
        let cache = small_cache(Duration::from_millis(10), 100);
        cache.set("k1", &1_u32);
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get::<u32>("k1").is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn sweep_purges_expired_entries() {
        let cache = small_cache(Duration::from_millis(10), 100);
        cache.set("k1", &1_u32);
        cache.set("k2", &2_u32);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.purge_expired(), 2);
    }

    #[test]
    fn capacity_overflow_evicts_least_recently_accessed() {
        let cache = small_cache(Duration::from_secs(60), 10);
        for i in 0..10 {
            cache.set(format!("k{i}"), &i);
        }
        // Touch k0 so it is the most recently used.
        let _ = cache.get::<i32>("k0");
        cache.set("k10", &10);

        assert!(cache.get::<i32>("k0").is_some());
        assert!(cache.get::<i32>("k10").is_some());
        assert!(cache.stats().entries <= 10);
    }

    #[test]
    fn pattern_invalidation_is_selective() {
        let cache = small_cache(Duration::from_secs(60), 100);
        cache.set("entity_perm:page:p1:mid", &"read_only".to_string());
        cache.set("entity_perm:page:p1:master", &"full".to_string());
        cache.set("entity_perm:page:p2:mid", &"full".to_string());

        let pattern = Regex::new("^entity_perm:page:p1:").unwrap();
        assert_eq!(cache.invalidate_matching(&pattern), 2);
        assert!(cache.get::<String>("entity_perm:page:p2:mid").is_some());
    }

    #[test]
    fn entity_invalidation_fans_out_over_tiers() {
        use tiergate_core::{EntityKind, Tier};
        let cache = small_cache(Duration::from_secs(60), 100);
        for tier in Tier::ALL {
            cache.set(keys::entity_permission(EntityKind::Page, "p1", tier), &1_u8);
        }
        cache.set(keys::hierarchy_snapshot(), &1_u8);
        cache.set(keys::entity_permission(EntityKind::Page, "p2", Tier::Mid), &1_u8);

        cache.invalidate_entity(EntityKind::Page, "p1");

        for tier in Tier::ALL {
            assert!(cache
                .get::<u8>(&keys::entity_permission(EntityKind::Page, "p1", tier))
                .is_none());
        }
        assert!(cache.get::<u8>(&keys::hierarchy_snapshot()).is_none());
        assert!(cache
            .get::<u8>(&keys::entity_permission(EntityKind::Page, "p2", Tier::Mid))
            .is_some());
    }

    #[test]
    fn stale_fill_loses_to_an_intervening_invalidation() {
        use tiergate_core::{EntityKind, Tier};
        let cache = small_cache(Duration::from_secs(60), 100);
        let key = keys::entity_permission(EntityKind::Page, "p1", Tier::Mid);

        // a reader snapshots the epoch, then a mutation invalidates the key
        let epoch = cache.invalidation_epoch();
        cache.invalidate_entity(EntityKind::Page, "p1");

        // the reader's fill carries the pre-invalidation snapshot and loses
        assert!(!cache.set_if_fresh(key.as_str(), &"none".to_string(), epoch));
        assert!(cache.get::<String>(&key).is_none());

        // a fill snapshotted after the invalidation lands normally
        let epoch = cache.invalidation_epoch();
        assert!(cache.set_if_fresh(key.as_str(), &"read_only".to_string(), epoch));
        assert_eq!(cache.get::<String>(&key).as_deref(), Some("read_only"));
    }

    #[test]
    fn stats_track_hits() {
        let cache = small_cache(Duration::from_secs(60), 100);
        cache.set("k1", &1_u32);
        let _ = cache.get::<u32>("k1");
        let _ = cache.get::<u32>("k1");
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_hits, 2);
    }
}
