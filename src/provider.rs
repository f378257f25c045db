//! Cache provider contract
//!
//! Every backend implements the same operation set. `get` and `exists` must
//! re-check expiry locally even when the backend enforces its own TTL, so
//! clock drift or backend TTL rounding can never surface a stale hit.

use crate::errors::ProviderResult;
use crate::types::{CacheStats, ProviderKind};
use serde_json::Value;
use std::future::Future;
use tracing::warn;

/// Operations every cache backend must implement
///
/// All async operations return `ProviderResult` for error handling; the
/// manager is responsible for folding errors into the public `CacheResult`.
pub trait CacheStore: Send + Sync {
    /// Get a value by logical key
    ///
    /// Returns `Ok(Some(value))` on a live hit, `Ok(None)` on a miss or an
    /// expired entry. Genuine hits update the entry's hit counters.
    fn get(&self, key: &str) -> impl Future<Output = ProviderResult<Option<Value>>> + Send;

    /// Write a value unconditionally, refreshing its TTL
    fn set(
        &self,
        key: &str,
        value: Value,
        ttl_seconds: u64,
        metadata: Option<Value>,
    ) -> impl Future<Output = ProviderResult<()>> + Send;

    /// Delete a key; returns whether it was present
    fn delete(&self, key: &str) -> impl Future<Output = ProviderResult<bool>> + Send;

    /// Liveness check with the same expiry rule as `get`, but without
    /// mutating hit counters or access order
    fn exists(&self, key: &str) -> impl Future<Output = ProviderResult<bool>> + Send;

    /// Remove entries matching a `*`/`?` glob pattern; `None` clears the
    /// whole namespace. Returns the count removed.
    fn clear(&self, pattern: Option<&str>) -> impl Future<Output = ProviderResult<u64>> + Send;

    /// Snapshot of this provider's cumulative counters
    fn stats(&self) -> impl Future<Output = ProviderResult<CacheStats>> + Send;

    /// Apply `clear` per pattern and sum the counts
    ///
    /// Best-effort: an individual pattern failure is logged and skipped,
    /// the remaining patterns still run.
    fn invalidate(&self, patterns: &[String]) -> impl Future<Output = ProviderResult<u64>> + Send
    where
        Self: Sized,
    {
        async move {
            let mut total = 0u64;
            for pattern in patterns {
                match self.clear(Some(pattern)).await {
                    Ok(count) => total += count,
                    Err(e) => {
                        warn!(
                            provider = self.provider_name(),
                            pattern = pattern.as_str(),
                            error = %e,
                            "Invalidate pattern failed, continuing"
                        );
                    }
                }
            }
            Ok(total)
        }
    }

    /// Whether the backend is currently reachable
    fn is_connected(&self) -> bool;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;

    /// Which public provider kind this backend is
    fn kind(&self) -> ProviderKind;
}
