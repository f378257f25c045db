//! In-process memory cache provider
//!
//! Always available; serves as the fallback target when the remote backend
//! is unreachable. Bounded by two independent limits - entry count and
//! estimated total byte size - with a pluggable eviction policy. The
//! check-evict-insert sequence runs as one critical section per key.
//!
//! A background sweep removes expired entries on a fixed interval so memory
//! held by dead entries is bounded between accesses, independent of the
//! read/write path.

use crate::config::{EvictionPolicy, MemoryCacheConfig};
use crate::errors::ProviderResult;
use crate::pattern::glob_match;
use crate::provider::CacheStore;
use crate::types::{CacheEntry, CacheStats, MemoryCacheEntry, ProviderKind, StatsRecorder};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Entry map plus the bookkeeping the eviction policies read
///
/// `access_clock` is a monotonic counter stamped onto entries on every read
/// and write; the LRU policy evicts the entry with the oldest stamp.
struct MemoryStore {
    entries: HashMap<String, MemoryCacheEntry>,
    access_clock: u64,
    total_bytes: usize,
}

impl MemoryStore {
    fn remove(&mut self, key: &str) -> Option<MemoryCacheEntry> {
        let removed = self.entries.remove(key);
        if let Some(entry) = &removed {
            self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        }
        removed
    }
}

/// Bounded in-process cache with pluggable eviction
pub struct MemoryCacheProvider {
    store: Arc<Mutex<MemoryStore>>,
    stats: Arc<StatsRecorder>,
    config: MemoryCacheConfig,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MemoryCacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.lock();
        f.debug_struct("MemoryCacheProvider")
            .field("entries", &store.entries.len())
            .field("total_bytes", &store.total_bytes)
            .field("policy", &self.config.eviction_policy)
            .finish()
    }
}

impl MemoryCacheProvider {
    /// Create a new memory provider from configuration
    ///
    /// The background sweep is not started here; call `start_sweeper` once a
    /// runtime is available, and `shutdown` to cancel it.
    pub fn new(config: MemoryCacheConfig) -> Self {
        let stats = Arc::new(StatsRecorder::new());
        // The in-process store always has exactly one "connection"
        stats.record_connection();

        debug!(
            max_entries = config.max_entries,
            max_memory_bytes = config.max_memory_bytes,
            policy = ?config.eviction_policy,
            "Memory cache provider created"
        );

        Self {
            store: Arc::new(Mutex::new(MemoryStore {
                entries: HashMap::new(),
                access_clock: 0,
                total_bytes: 0,
            })),
            stats,
            config,
            sweep_task: Mutex::new(None),
        }
    }

    /// Deterministic, cheap size estimate: serialized JSON length plus key
    /// length. Not exact, but monotonic with payload growth, which is all
    /// the memory budget needs.
    pub fn estimate_size(key: &str, value: &Value) -> usize {
        value.to_string().len() + key.len()
    }

    /// Start the background sweep that proactively removes expired entries
    ///
    /// Idempotent; a zero sweep interval disables the sweep entirely.
    pub fn start_sweeper(&self) {
        if self.config.sweep_interval_ms == 0 {
            return;
        }
        let mut slot = self.sweep_task.lock();
        if slot.is_some() {
            return;
        }

        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let interval = self.config.sweep_interval();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a freshly started
            // sweeper does not race the first writes
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = {
                    let mut store = store.lock();
                    let now = Utc::now();
                    let before = store.entries.len();
                    let dead: Vec<String> = store
                        .entries
                        .iter()
                        .filter(|(_, e)| e.entry.is_expired(now))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in &dead {
                        store.remove(key);
                    }
                    stats.set_memory_bytes(store.total_bytes as u64);
                    before - store.entries.len()
                };
                if removed > 0 {
                    debug!(removed = removed, "Memory cache sweep removed expired entries");
                }
            }
        }));
    }

    /// Cancel the background sweep
    pub fn shutdown(&self) {
        if let Some(task) = self.sweep_task.lock().take() {
            task.abort();
        }
    }

    /// Current resident entry count
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current estimated resident byte size
    pub fn memory_bytes(&self) -> usize {
        self.store.lock().total_bytes
    }

    /// Clone of an entry's bookkeeping, without touching access order
    pub fn peek(&self, key: &str) -> Option<MemoryCacheEntry> {
        self.store.lock().entries.get(key).cloned()
    }

    pub fn stats_recorder(&self) -> &Arc<StatsRecorder> {
        &self.stats
    }

    /// Pick the eviction victim for the configured policy
    ///
    /// Scans the entry map using the per-entry stamps and counters; runs
    /// only when a capacity bound is hit.
    fn select_victim(store: &MemoryStore, policy: EvictionPolicy) -> Option<String> {
        if store.entries.is_empty() {
            return None;
        }
        let key = match policy {
            EvictionPolicy::Lru => store
                .entries
                .iter()
                .min_by_key(|(_, e)| e.touched_at)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => store
                .entries
                .iter()
                .min_by_key(|(_, e)| e.access_count)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Ttl => store
                .entries
                .iter()
                .min_by_key(|(_, e)| e.entry.expires_at())
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Random => {
                let idx = rand::thread_rng().gen_range(0..store.entries.len());
                store.entries.keys().nth(idx).cloned()
            }
        };
        key
    }

    /// Enforce both capacity bounds before an insert of `new_size` bytes
    fn evict_if_needed(&self, store: &mut MemoryStore, new_size: usize) {
        while store.entries.len() >= self.config.max_entries {
            let Some(victim) = Self::select_victim(store, self.config.eviction_policy) else {
                break;
            };
            trace!(key = victim.as_str(), policy = ?self.config.eviction_policy, "Evicting entry (count bound)");
            store.remove(&victim);
            self.stats.record_eviction();
        }
        while store.total_bytes + new_size > self.config.max_memory_bytes
            && !store.entries.is_empty()
        {
            let Some(victim) = Self::select_victim(store, self.config.eviction_policy) else {
                break;
            };
            trace!(key = victim.as_str(), policy = ?self.config.eviction_policy, "Evicting entry (memory bound)");
            store.remove(&victim);
            self.stats.record_eviction();
        }
    }
}

impl CacheStore for MemoryCacheProvider {
    async fn get(&self, key: &str) -> ProviderResult<Option<Value>> {
        let mut store = self.store.lock();
        let now = Utc::now();

        let expired = matches!(store.entries.get(key), Some(e) if e.entry.is_expired(now));
        if expired {
            store.remove(key);
            self.stats.set_memory_bytes(store.total_bytes as u64);
            self.stats.record_miss();
            debug!(key = key, "Cache MISS (memory, expired)");
            return Ok(None);
        }

        store.access_clock += 1;
        let clock = store.access_clock;
        match store.entries.get_mut(key) {
            Some(entry) => {
                entry.touched_at = clock;
                entry.access_count += 1;
                entry.entry.touch();
                self.stats.record_hit();
                debug!(key = key, "Cache HIT (memory)");
                Ok(Some(entry.entry.value.clone()))
            }
            None => {
                self.stats.record_miss();
                debug!(key = key, "Cache MISS (memory)");
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl_seconds: u64,
        metadata: Option<Value>,
    ) -> ProviderResult<()> {
        let size_bytes = Self::estimate_size(key, &value);

        // Check-evict-insert is one critical section per key
        let mut store = self.store.lock();
        store.remove(key);
        self.evict_if_needed(&mut store, size_bytes);

        store.access_clock += 1;
        let touched_at = store.access_clock;
        store.entries.insert(
            key.to_string(),
            MemoryCacheEntry {
                entry: CacheEntry::new(value, ttl_seconds, metadata),
                access_count: 1,
                size_bytes,
                touched_at,
            },
        );
        store.total_bytes += size_bytes;
        self.stats.record_set();
        self.stats.set_memory_bytes(store.total_bytes as u64);

        debug!(key = key, ttl_seconds = ttl_seconds, size_bytes = size_bytes, "Cache SET (memory)");
        Ok(())
    }

    async fn delete(&self, key: &str) -> ProviderResult<bool> {
        let mut store = self.store.lock();
        let was_present = store.remove(key).is_some();
        if was_present {
            self.stats.record_delete();
            self.stats.set_memory_bytes(store.total_bytes as u64);
        }
        debug!(key = key, was_present = was_present, "Cache DEL (memory)");
        Ok(was_present)
    }

    async fn exists(&self, key: &str) -> ProviderResult<bool> {
        let mut store = self.store.lock();
        let now = Utc::now();
        // Same expiry rule as `get`, but no hit counters and no access-order
        // touch - `exists` must not perturb eviction
        match store.entries.get(key) {
            Some(entry) if entry.entry.is_expired(now) => {
                store.remove(key);
                self.stats.set_memory_bytes(store.total_bytes as u64);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn clear(&self, pattern: Option<&str>) -> ProviderResult<u64> {
        let mut store = self.store.lock();
        let removed = match pattern {
            None => {
                let count = store.entries.len() as u64;
                store.entries.clear();
                store.total_bytes = 0;
                count
            }
            Some(pattern) => {
                let matching: Vec<String> = store
                    .entries
                    .keys()
                    .filter(|k| glob_match(pattern, k))
                    .cloned()
                    .collect();
                for key in &matching {
                    store.remove(key);
                }
                matching.len() as u64
            }
        };
        self.stats.set_memory_bytes(store.total_bytes as u64);
        debug!(pattern = pattern.unwrap_or("<all>"), removed = removed, "Cache CLEAR (memory)");
        Ok(removed)
    }

    async fn stats(&self) -> ProviderResult<CacheStats> {
        Ok(self.stats.snapshot())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn provider(max_entries: usize, policy: EvictionPolicy) -> MemoryCacheProvider {
        MemoryCacheProvider::new(MemoryCacheConfig {
            max_entries,
            max_memory_bytes: 1024 * 1024,
            eviction_policy: policy,
            sweep_interval_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_set_and_get_round_trip() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache
            .set("user:1", json!({"name": "ada"}), 60, None)
            .await
            .unwrap();

        let value = cache.get("user:1").await.unwrap();
        assert_eq!(value, Some(json!({"name": "ada"})));
    }

    #[tokio::test]
    async fn test_get_miss_returns_none() {
        let cache = provider(10, EvictionPolicy::Lru);
        assert_eq!(cache.get("absent").await.unwrap(), None);
        assert_eq!(cache.stats().await.unwrap().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("short", json!(1), 1, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_count_bound_keeps_exactly_max_entries() {
        let cache = provider(100, EvictionPolicy::Lru);
        for i in 0..150 {
            cache
                .set(&format!("key:{i}"), json!(i), 60, None)
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.stats().await.unwrap().evictions, 50);
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recently_accessed() {
        let cache = provider(2, EvictionPolicy::Lru);
        cache.set("a", json!("a"), 60, None).await.unwrap();
        cache.set("b", json!("b"), 60, None).await.unwrap();

        // Touch A so B becomes the oldest
        cache.get("a").await.unwrap();
        cache.set("c", json!("c"), 60, None).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lfu_evicts_least_frequently_accessed() {
        let cache = provider(2, EvictionPolicy::Lfu);
        cache.set("hot", json!(1), 60, None).await.unwrap();
        cache.set("cold", json!(2), 60, None).await.unwrap();

        for _ in 0..5 {
            cache.get("hot").await.unwrap();
        }
        cache.set("new", json!(3), 60, None).await.unwrap();

        assert!(cache.get("hot").await.unwrap().is_some());
        assert!(cache.get("cold").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_policy_evicts_soonest_to_expire() {
        let cache = provider(2, EvictionPolicy::Ttl);
        cache.set("dying", json!(1), 5, None).await.unwrap();
        cache.set("lasting", json!(2), 600, None).await.unwrap();

        cache.set("new", json!(3), 300, None).await.unwrap();

        assert!(cache.get("dying").await.unwrap().is_none());
        assert!(cache.get("lasting").await.unwrap().is_some());
        assert!(cache.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_random_policy_respects_bound() {
        let cache = provider(10, EvictionPolicy::Random);
        for i in 0..50 {
            cache
                .set(&format!("key:{i}"), json!(i), 60, None)
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 10);
    }

    #[tokio::test]
    async fn test_memory_bound_evicts_independently_of_count() {
        let cache = MemoryCacheProvider::new(MemoryCacheConfig {
            max_entries: 1000,
            max_memory_bytes: 600,
            eviction_policy: EvictionPolicy::Lru,
            sweep_interval_ms: 0,
        });

        // Each entry is ~110 bytes; the byte budget binds long before the
        // count bound does
        let blob = "x".repeat(100);
        for i in 0..20 {
            cache
                .set(&format!("k{i}"), json!(blob), 60, None)
                .await
                .unwrap();
        }

        assert!(cache.len() < 20);
        assert!(cache.memory_bytes() <= 600);
        assert!(cache.stats().await.unwrap().evictions > 0);
    }

    #[tokio::test]
    async fn test_exists_does_not_touch_access_order() {
        let cache = provider(2, EvictionPolicy::Lru);
        cache.set("a", json!(1), 60, None).await.unwrap();
        cache.set("b", json!(2), 60, None).await.unwrap();

        // exists() must not refresh A's access stamp, so A is still the
        // LRU victim when C arrives
        assert!(cache.exists("a").await.unwrap());
        cache.set("c", json!(3), 60, None).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exists_applies_expiry_without_counting_a_miss() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("short", json!(1), 1, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(!cache.exists("short").await.unwrap());
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_ttl_and_does_not_leak_bytes() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("k", json!("first"), 60, None).await.unwrap();
        let bytes_after_first = cache.memory_bytes();

        cache.set("k", json!("second"), 120, None).await.unwrap();

        assert_eq!(cache.len(), 1);
        let entry = cache.peek("k").unwrap();
        assert_eq!(entry.entry.ttl_seconds, 120);
        // Replacement accounting: old size released, new size charged
        assert_eq!(
            cache.memory_bytes(),
            bytes_after_first + 1 // "second" is one byte longer than "first"
        );
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("k", json!(1), 60, None).await.unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.stats().await.unwrap().deletes, 1);
    }

    #[tokio::test]
    async fn test_clear_with_pattern_removes_only_matches() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("user:1", json!(1), 60, None).await.unwrap();
        cache.set("user:2", json!(2), 60, None).await.unwrap();
        cache.set("session:1", json!(3), 60, None).await.unwrap();

        let removed = cache.clear(Some("user:*")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("session:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_without_pattern_empties_namespace() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("a", json!(1), 60, None).await.unwrap();
        cache.set("b", json!(2), 60, None).await.unwrap();

        assert_eq!(cache.clear(None).await.unwrap(), 2);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_sums_across_patterns() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("user:1", json!(1), 60, None).await.unwrap();
        cache.set("session:1", json!(2), 60, None).await.unwrap();
        cache.set("other", json!(3), 60, None).await.unwrap();

        let total = cache
            .invalidate(&["user:*".to_string(), "session:*".to_string()])
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_background_sweep_removes_expired_entries() {
        let cache = MemoryCacheProvider::new(MemoryCacheConfig {
            max_entries: 100,
            max_memory_bytes: 1024 * 1024,
            eviction_policy: EvictionPolicy::Lru,
            sweep_interval_ms: 200,
        });
        cache.start_sweeper();

        cache.set("short", json!(1), 1, None).await.unwrap();
        cache.set("long", json!(2), 600, None).await.unwrap();
        assert_eq!(cache.len(), 2);

        // Expiry after 1s, sweep every 200ms: the dead entry is collected
        // without any read touching it
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.peek("long").is_some());
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_estimate_size_is_monotonic() {
        let small = MemoryCacheProvider::estimate_size("k", &json!("a"));
        let large = MemoryCacheProvider::estimate_size("k", &json!("a".repeat(100)));
        assert!(large > small);
    }
}
