//! Cache manager configuration
//!
//! Serde-deserializable configuration with production defaults and explicit
//! validation. Durations are carried as whole milliseconds/seconds fields
//! with `Duration` accessor helpers.
//!
//! The prefetch and compression knobs are validated here but consumed by
//! external wiring; the core manager logic does not act on them.

use crate::errors::CacheError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which provider(s) the manager should run with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Remote backend only; fallback applies only if enabled
    Remote,
    /// In-process memory cache only; no fallback machinery engaged
    Memory,
    /// Attempt remote, fall back to memory per the fallback config
    Auto,
}

/// Eviction policy for the memory provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the entry with the oldest last-access stamp
    Lru,
    /// Evict the entry with the lowest cumulative access count
    Lfu,
    /// Evict the entry with the nearest expiry instant
    Ttl,
    /// Evict a uniformly random entry
    Random,
}

/// What serves traffic when the remote backend is unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    /// Serve from the in-process memory cache
    Memory,
    /// No fallback; operations fail while remote is down
    None,
}

/// Remote (Redis) provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCacheConfig {
    /// Redis connection URL, e.g. `redis://localhost:6379/0`
    pub url: String,
    /// Bound on connection establishment
    pub connection_timeout_ms: u64,
    /// Bound on individual commands
    pub response_timeout_ms: u64,
}

impl RemoteCacheConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout_ms: 5_000,
            response_timeout_ms: 2_000,
        }
    }
}

/// Memory provider bounds and sweep cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Entry-count bound
    pub max_entries: usize,
    /// Estimated-byte-size bound, independent of `max_entries`
    pub max_memory_bytes: usize,
    pub eviction_policy: EvictionPolicy,
    /// Interval of the background sweep that removes expired entries;
    /// zero disables the sweep
    pub sweep_interval_ms: u64,
}

impl MemoryCacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_memory_bytes: 64 * 1024 * 1024,
            eviction_policy: EvictionPolicy::Lru,
            sweep_interval_ms: 60_000,
        }
    }
}

/// Failover behavior when the remote backend is unreachable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub strategy: FallbackStrategy,
    /// Fixed delay between reconnect attempts (no exponential backoff)
    pub retry_interval_ms: u64,
    /// Reconnect attempts before entering permanent fallback
    pub max_retries: u32,
}

impl FallbackConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: FallbackStrategy::Memory,
            retry_interval_ms: 5_000,
            max_retries: 10,
        }
    }
}

/// Throughput knobs; batching is the only one the core acts on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub enable_prefetch: bool,
    /// Hit count past which external wiring may prefetch
    pub prefetch_threshold: u64,
    pub enable_compression: bool,
    /// Minimum serialized size before external wiring compresses
    pub compression_threshold_bytes: usize,
    /// Queue `set`/`delete` calls and flush them together
    pub enable_batching: bool,
    /// Flush when the queue reaches this length
    pub batch_size: usize,
    /// Flush when this much time has passed since the first queued op
    pub batch_timeout_ms: u64,
}

impl OptimizationConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enable_prefetch: false,
            prefetch_threshold: 3,
            enable_compression: false,
            compression_threshold_bytes: 1024,
            enable_batching: false,
            batch_size: 50,
            batch_timeout_ms: 100,
        }
    }
}

/// Synthetic write-read-delete probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
            timeout_ms: 5_000,
        }
    }
}

/// Broadcast channel sizing for emitted events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventChannelConfig {
    pub capacity: usize,
}

impl Default for EventChannelConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Top-level cache manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManagerConfig {
    pub provider: ProviderMode,
    /// Prepended to every logical key on the remote wire; never inferred
    pub key_prefix: String,
    /// TTL applied when a `set` call does not specify one
    pub default_ttl_seconds: u64,
    pub remote: Option<RemoteCacheConfig>,
    pub memory: MemoryCacheConfig,
    pub fallback: FallbackConfig,
    pub optimization: OptimizationConfig,
    pub health_check: HealthCheckConfig,
    pub events: EventChannelConfig,
}

impl Default for CacheManagerConfig {
    /// Production defaults: auto mode with memory fallback enabled
    fn default() -> Self {
        Self {
            provider: ProviderMode::Auto,
            key_prefix: "cache:".to_string(),
            default_ttl_seconds: 300,
            remote: Some(RemoteCacheConfig::default()),
            memory: MemoryCacheConfig::default(),
            fallback: FallbackConfig::default(),
            optimization: OptimizationConfig::default(),
            health_check: HealthCheckConfig::default(),
            events: EventChannelConfig::default(),
        }
    }
}

impl CacheManagerConfig {
    /// Memory-only configuration with aggressive intervals for tests
    pub fn for_test() -> Self {
        Self {
            provider: ProviderMode::Memory,
            key_prefix: "test:".to_string(),
            default_ttl_seconds: 60,
            remote: None,
            memory: MemoryCacheConfig {
                max_entries: 100,
                max_memory_bytes: 1024 * 1024,
                eviction_policy: EvictionPolicy::Lru,
                sweep_interval_ms: 100,
            },
            fallback: FallbackConfig {
                enabled: false,
                strategy: FallbackStrategy::None,
                retry_interval_ms: 50,
                max_retries: 3,
            },
            optimization: OptimizationConfig {
                batch_size: 5,
                batch_timeout_ms: 50,
                ..OptimizationConfig::default()
            },
            health_check: HealthCheckConfig {
                enabled: false,
                interval_ms: 100,
                timeout_ms: 100,
            },
            events: EventChannelConfig { capacity: 256 },
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Validate invariants the manager relies on
    ///
    /// Returns `CacheError::Validation` describing the first violation.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.default_ttl_seconds == 0 {
            return Err(CacheError::Validation(
                "default_ttl_seconds must be at least 1".to_string(),
            ));
        }
        if self.memory.max_entries == 0 {
            return Err(CacheError::Validation(
                "memory.max_entries must be at least 1".to_string(),
            ));
        }
        if self.memory.max_memory_bytes == 0 {
            return Err(CacheError::Validation(
                "memory.max_memory_bytes must be at least 1".to_string(),
            ));
        }
        if self.optimization.enable_batching && self.optimization.batch_size == 0 {
            return Err(CacheError::Validation(
                "optimization.batch_size must be at least 1 when batching is enabled".to_string(),
            ));
        }
        if self.optimization.enable_batching && self.optimization.batch_timeout_ms == 0 {
            return Err(CacheError::Validation(
                "optimization.batch_timeout_ms must be at least 1 when batching is enabled"
                    .to_string(),
            ));
        }
        if self.optimization.enable_prefetch && self.optimization.prefetch_threshold == 0 {
            return Err(CacheError::Validation(
                "optimization.prefetch_threshold must be at least 1".to_string(),
            ));
        }
        if self.optimization.enable_compression && self.optimization.compression_threshold_bytes < 64
        {
            return Err(CacheError::Validation(
                "optimization.compression_threshold_bytes must be at least 64".to_string(),
            ));
        }
        if matches!(self.provider, ProviderMode::Remote | ProviderMode::Auto)
            && self.remote.is_none()
        {
            return Err(CacheError::Validation(format!(
                "provider mode {:?} requires a remote configuration",
                self.provider
            )));
        }
        if self.fallback.enabled
            && self.fallback.strategy == FallbackStrategy::Memory
            && self.fallback.retry_interval_ms == 0
        {
            return Err(CacheError::Validation(
                "fallback.retry_interval_ms must be at least 1 when fallback is enabled"
                    .to_string(),
            ));
        }
        if self.health_check.enabled && self.health_check.interval_ms == 0 {
            return Err(CacheError::Validation(
                "health_check.interval_ms must be at least 1 when enabled".to_string(),
            ));
        }
        if self.events.capacity == 0 {
            return Err(CacheError::Validation(
                "events.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CacheManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_for_test_config_is_valid() {
        assert!(CacheManagerConfig::for_test().validate().is_ok());
    }

    #[test]
    fn test_remote_mode_requires_remote_config() {
        let config = CacheManagerConfig {
            provider: ProviderMode::Remote,
            remote: None,
            ..CacheManagerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::Validation(_))
        ));
    }

    #[test]
    fn test_memory_mode_does_not_require_remote_config() {
        let config = CacheManagerConfig {
            provider: ProviderMode::Memory,
            remote: None,
            ..CacheManagerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected_when_batching_enabled() {
        let mut config = CacheManagerConfig::default();
        config.optimization.enable_batching = true;
        config.optimization.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_bounds_rejected() {
        let mut config = CacheManagerConfig::for_test();
        config.memory.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = CacheManagerConfig::for_test();
        config.memory.max_memory_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = CacheManagerConfig::for_test();
        config.default_ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compression_threshold_floor() {
        let mut config = CacheManagerConfig::default();
        config.optimization.enable_compression = true;
        config.optimization.compression_threshold_bytes = 16;
        assert!(config.validate().is_err());

        config.optimization.compression_threshold_bytes = 64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = CacheManagerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: CacheManagerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.provider, ProviderMode::Auto);
        assert_eq!(decoded.memory.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(decoded.key_prefix, "cache:");
    }

    #[test]
    fn test_duration_helpers() {
        let config = CacheManagerConfig::default();
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.fallback.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.health_check.interval(), Duration::from_secs(30));
        assert_eq!(
            config.optimization.batch_timeout(),
            Duration::from_millis(100)
        );
    }
}
