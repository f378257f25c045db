//! Core data types shared across providers, the manager, and metrics
//!
//! The expiry rule lives here: `CacheEntry::is_expired` compares against
//! `timestamp + ttl_seconds` and is the sole expiry authority on every read
//! path, regardless of any TTL the backend enforces on its own clock.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Which concrete backend served an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Shared remote backend (Redis)
    Remote,
    /// In-process memory cache
    Memory,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Remote => "remote",
            ProviderKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cached value with its expiry and access bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload
    pub value: T,

    /// Write time; `timestamp + ttl_seconds` is the expiry instant
    pub timestamp: DateTime<Utc>,

    /// Whole seconds after `timestamp` before the entry is considered expired
    pub ttl_seconds: u64,

    /// Read counter, incremented on every genuine hit
    pub hits: u64,

    /// Last read or write time
    pub last_accessed: DateTime<Utc>,

    /// Caller-supplied opaque metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl<T> CacheEntry<T> {
    /// Create a fresh entry written now
    pub fn new(value: T, ttl_seconds: u64, metadata: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            value,
            timestamp: now,
            ttl_seconds,
            hits: 0,
            last_accessed: now,
            metadata,
        }
    }

    /// The instant past which this entry must never be returned as a hit
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + ChronoDuration::seconds(self.ttl_seconds as i64)
    }

    /// Expiry check against the given clock reading
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Record a read: bump the hit counter and refresh the access stamp
    pub fn touch(&mut self) {
        self.hits += 1;
        self.last_accessed = Utc::now();
    }
}

/// Memory-provider entry: a `CacheEntry` plus eviction bookkeeping
#[derive(Debug, Clone)]
pub struct MemoryCacheEntry {
    pub entry: CacheEntry<Value>,

    /// Cumulative access count used by the LFU policy
    pub access_count: u64,

    /// Estimated serialized byte size, charged against the memory budget
    pub size_bytes: usize,

    /// Monotonic access-clock stamp used by the LRU policy
    pub touched_at: u64,
}

/// Uniform, non-throwing result for all manager read/write/delete operations
///
/// Callers never receive an `Err` from `get`/`set`/`delete`/`exists`/`clear`/
/// `invalidate`; failures are reported through `success` and `error`.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
    /// Whether the operation completed without error
    pub success: bool,

    /// The value, on a successful `get` hit
    pub value: Option<T>,

    /// True only on a genuine cache hit
    pub from_cache: bool,

    /// Backend that served (or attempted) the operation
    pub provider: Option<ProviderKind>,

    /// Wall-clock time spent inside the manager call
    pub latency: Duration,

    /// Error message when `success` is false
    pub error: Option<String>,
}

impl<T> CacheResult<T> {
    /// A successful hit carrying a value
    pub fn hit(value: T, provider: ProviderKind, latency: Duration) -> Self {
        Self {
            success: true,
            value: Some(value),
            from_cache: true,
            provider: Some(provider),
            latency,
            error: None,
        }
    }

    /// A successful operation with no value (miss, ack, etc.)
    pub fn ok(provider: ProviderKind, latency: Duration) -> Self {
        Self {
            success: true,
            value: None,
            from_cache: false,
            provider: Some(provider),
            latency,
            error: None,
        }
    }

    /// A failed operation; the error is carried as a message, never thrown
    pub fn failure(error: impl Into<String>, provider: Option<ProviderKind>, latency: Duration) -> Self {
        Self {
            success: false,
            value: None,
            from_cache: false,
            provider,
            latency,
            error: Some(error.into()),
        }
    }
}

/// Point-in-time snapshot of a provider's cumulative counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub memory_bytes: u64,
    pub connections: u64,
    pub uptime_ms: u64,
    pub last_updated: DateTime<Utc>,
}

impl CacheStats {
    /// Hit rate over all recorded reads (0.0 when no reads yet)
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            return 0.0;
        }
        self.hits as f64 / reads as f64
    }
}

/// Atomic accumulator behind each provider's `CacheStats`
///
/// Counters accumulate monotonically until an explicit `reset()`.
#[derive(Debug)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    memory_bytes: AtomicU64,
    connections: AtomicU64,
    last_updated_ms: AtomicI64,
    started_at: Instant,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            memory_bytes: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            last_updated_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            started_at: Instant::now(),
        }
    }

    fn stamp(&self) {
        self.last_updated_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }

    pub fn set_memory_bytes(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::Relaxed);
        self.stamp();
    }

    /// Zero every counter; uptime keeps running
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.memory_bytes.store(0, Ordering::Relaxed);
        self.stamp();
    }

    pub fn snapshot(&self) -> CacheStats {
        let last_updated_ms = self.last_updated_ms.load(Ordering::Relaxed);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            last_updated: DateTime::from_timestamp_millis(last_updated_ms)
                .unwrap_or_else(Utc::now),
        }
    }
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of operation queued for batched execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOpKind {
    Get,
    Set,
    Delete,
}

/// A write deferred into the batch queue
///
/// Created when batching is enabled and a `set`/`delete` call arrives; lives
/// in FIFO order until a flush executes it against the active provider.
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub op: BatchOpKind,
    pub key: String,
    pub value: Option<Value>,
    pub ttl_seconds: Option<u64>,
    pub metadata: Option<Value>,
    pub enqueued_at: DateTime<Utc>,
}

impl BatchOperation {
    pub fn set(key: String, value: Value, ttl_seconds: Option<u64>, metadata: Option<Value>) -> Self {
        Self {
            op: BatchOpKind::Set,
            key,
            value: Some(value),
            ttl_seconds,
            metadata,
            enqueued_at: Utc::now(),
        }
    }

    pub fn delete(key: String) -> Self {
        Self {
            op: BatchOpKind::Delete,
            key,
            value: None,
            ttl_seconds: None,
            metadata: None,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_not_expired_before_ttl() {
        let entry = CacheEntry::new(json!("v"), 60, None);
        assert!(!entry.is_expired(Utc::now()));
    }

    #[test]
    fn test_entry_expired_past_ttl() {
        let mut entry = CacheEntry::new(json!("v"), 1, None);
        entry.timestamp = Utc::now() - ChronoDuration::seconds(2);
        assert!(entry.is_expired(Utc::now()));
    }

    #[test]
    fn test_entry_expiry_boundary_is_exclusive_for_hits() {
        // An entry exactly at its expiry instant must not be served
        let mut entry = CacheEntry::new(json!("v"), 5, None);
        let at_expiry = entry.timestamp + ChronoDuration::seconds(5);
        entry.ttl_seconds = 5;
        assert!(entry.is_expired(at_expiry));
    }

    #[test]
    fn test_touch_bumps_hits_and_access_stamp() {
        let mut entry = CacheEntry::new(json!(1), 60, None);
        let before = entry.last_accessed;
        entry.touch();
        entry.touch();
        assert_eq!(entry.hits, 2);
        assert!(entry.last_accessed >= before);
    }

    #[test]
    fn test_stats_recorder_accumulates_until_reset() {
        let recorder = StatsRecorder::new();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        recorder.record_set();
        recorder.record_eviction();
        recorder.set_memory_bytes(2048);

        let snap = recorder.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.sets, 1);
        assert_eq!(snap.evictions, 1);
        assert_eq!(snap.memory_bytes, 2048);
        assert!((snap.hit_rate() - 2.0 / 3.0).abs() < 1e-9);

        recorder.reset();
        let snap = recorder.snapshot();
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.memory_bytes, 0);
        assert_eq!(snap.hit_rate(), 0.0);
    }

    #[test]
    fn test_cache_result_constructors() {
        let hit = CacheResult::hit(42, ProviderKind::Remote, Duration::from_millis(3));
        assert!(hit.success);
        assert!(hit.from_cache);
        assert_eq!(hit.value, Some(42));

        let miss: CacheResult<i32> = CacheResult::ok(ProviderKind::Memory, Duration::ZERO);
        assert!(miss.success);
        assert!(!miss.from_cache);
        assert!(miss.value.is_none());

        let failed: CacheResult<i32> =
            CacheResult::failure("No cache provider available", None, Duration::ZERO);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("No cache provider available"));
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let entry = CacheEntry::new(json!({"a": 1}), 30, Some(json!({"source": "test"})));
        let raw = serde_json::to_string(&entry).unwrap();
        let decoded: CacheEntry<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.value, entry.value);
        assert_eq!(decoded.ttl_seconds, 30);
        assert_eq!(decoded.metadata, entry.metadata);
    }
}
