//! # Cache Manager
//!
//! The orchestrator external callers invoke directly. Selects the active
//! provider, runs the fallback/retry state machine, owns the write-batching
//! queue and the health-check loop, and emits lifecycle events for passive
//! consumers.
//!
//! ## Architecture
//!
//! ```text
//! CacheManager
//!   ├── RemoteCacheProvider   <- Redis, serves while ActiveRemote
//!   ├── MemoryCacheProvider   <- always-available fallback target
//!   ├── StateCell             <- ActiveRemote / DegradedRetrying / ...
//!   ├── BatchQueue            <- FIFO write batching (opt-in)
//!   └── CacheEventPublisher   <- operation / health / failover events
//! ```
//!
//! Degraded mode is silent to callers: operations keep returning
//! `success = true` from the memory provider while failover events make the
//! degradation observable to operators.

pub mod batch;
pub mod fallback;

pub use batch::{BatchExecutionReport, BatchOpResult, FlushTrigger};
pub use fallback::{FallbackState, StateCell};

use crate::config::{CacheManagerConfig, FallbackStrategy, ProviderMode};
use crate::errors::CacheError;
use crate::events::{CacheEvent, CacheEventPublisher, OperationKind};
use crate::pattern::validate_key;
use crate::provider::CacheStore;
use crate::providers::memory::MemoryCacheProvider;
use crate::providers::remote::RemoteCacheProvider;
use crate::types::{
    BatchOpKind, BatchOperation, CacheResult, CacheStats, ProviderKind,
};
use batch::BatchQueue;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Zero-cost dispatch over the currently selected backend
///
/// Selection happens once per operation; the enum avoids a vtable on the
/// hot path.
enum ActiveCache<'a> {
    Remote(&'a RemoteCacheProvider),
    Memory(&'a MemoryCacheProvider),
}

impl ActiveCache<'_> {
    fn kind(&self) -> ProviderKind {
        match self {
            ActiveCache::Remote(_) => ProviderKind::Remote,
            ActiveCache::Memory(_) => ProviderKind::Memory,
        }
    }

    async fn get(&self, key: &str) -> crate::errors::ProviderResult<Option<Value>> {
        match self {
            ActiveCache::Remote(p) => p.get(key).await,
            ActiveCache::Memory(p) => p.get(key).await,
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl_seconds: u64,
        metadata: Option<Value>,
    ) -> crate::errors::ProviderResult<()> {
        match self {
            ActiveCache::Remote(p) => p.set(key, value, ttl_seconds, metadata).await,
            ActiveCache::Memory(p) => p.set(key, value, ttl_seconds, metadata).await,
        }
    }

    async fn delete(&self, key: &str) -> crate::errors::ProviderResult<bool> {
        match self {
            ActiveCache::Remote(p) => p.delete(key).await,
            ActiveCache::Memory(p) => p.delete(key).await,
        }
    }

    async fn exists(&self, key: &str) -> crate::errors::ProviderResult<bool> {
        match self {
            ActiveCache::Remote(p) => p.exists(key).await,
            ActiveCache::Memory(p) => p.exists(key).await,
        }
    }

    async fn clear(&self, pattern: Option<&str>) -> crate::errors::ProviderResult<u64> {
        match self {
            ActiveCache::Remote(p) => p.clear(pattern).await,
            ActiveCache::Memory(p) => p.clear(pattern).await,
        }
    }

    async fn invalidate(&self, patterns: &[String]) -> crate::errors::ProviderResult<u64> {
        match self {
            ActiveCache::Remote(p) => p.invalidate(patterns).await,
            ActiveCache::Memory(p) => p.invalidate(patterns).await,
        }
    }
}

/// Combined stats snapshot across both providers
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub state: FallbackState,
    pub active_provider: Option<ProviderKind>,
    pub remote: Option<CacheStats>,
    pub memory: Option<CacheStats>,
}

struct ManagerInner {
    config: CacheManagerConfig,
    remote: Option<RemoteCacheProvider>,
    memory: Option<MemoryCacheProvider>,
    state: StateCell,
    retry_attempts: AtomicU32,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    batch: Mutex<BatchQueue>,
    events: CacheEventPublisher,
    shutdown_flag: AtomicBool,
}

/// The unified cache entry point
///
/// Cheap to clone; all clones share the same providers, state machine, and
/// batch queue.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("state", &self.inner.state.load())
            .field("provider_mode", &self.inner.config.provider)
            .field("batching", &self.inner.config.optimization.enable_batching)
            .finish()
    }
}

impl CacheManager {
    /// Validate configuration, build providers, attempt the initial remote
    /// connection per the configured mode, and start background loops
    ///
    /// This is the only entry point that returns an error: a validation
    /// failure is a startup-time configuration problem. A remote connect
    /// failure is not an error here - it lands the manager in degraded or
    /// unavailable state per the fallback configuration.
    pub async fn initialize(config: CacheManagerConfig) -> Result<Self, CacheError> {
        config.validate()?;

        let events = CacheEventPublisher::new(config.events.capacity);
        let fallback_available =
            config.fallback.enabled && config.fallback.strategy == FallbackStrategy::Memory;

        let (remote, memory, initial_state) = match config.provider {
            ProviderMode::Memory => {
                let memory = MemoryCacheProvider::new(config.memory.clone());
                (None, Some(memory), FallbackState::MemoryOnly)
            }
            ProviderMode::Remote | ProviderMode::Auto => {
                let remote_config = config
                    .remote
                    .clone()
                    .expect("validated: remote config present");
                let remote = RemoteCacheProvider::new(remote_config, config.key_prefix.clone());
                let memory =
                    fallback_available.then(|| MemoryCacheProvider::new(config.memory.clone()));

                let initial_state = match remote.connect().await {
                    Ok(()) => {
                        info!(mode = ?config.provider, "Remote cache connected, serving from remote");
                        FallbackState::ActiveRemote
                    }
                    Err(e) if fallback_available => {
                        warn!(error = %e, "Remote connect failed, serving from memory while retrying");
                        events.publish(CacheEvent::RemoteFailure {
                            error: e.to_string(),
                            at: Utc::now(),
                        });
                        FallbackState::DegradedRetrying
                    }
                    Err(e) => {
                        warn!(error = %e, "Remote connect failed and no fallback is configured");
                        FallbackState::Unavailable
                    }
                };
                (Some(remote), memory, initial_state)
            }
        };

        let inner = Arc::new(ManagerInner {
            config,
            remote,
            memory,
            state: StateCell::new(initial_state),
            retry_attempts: AtomicU32::new(0),
            retry_task: Mutex::new(None),
            health_task: Mutex::new(None),
            batch: Mutex::new(BatchQueue::new()),
            events,
            shutdown_flag: AtomicBool::new(false),
        });

        if let Some(memory) = &inner.memory {
            memory.start_sweeper();
        }
        if initial_state == FallbackState::DegradedRetrying {
            inner.spawn_retry_loop();
        }
        if inner.config.health_check.enabled {
            inner.spawn_health_loop();
        }

        inner.events.publish(CacheEvent::Initialized {
            provider_mode: format!("{:?}", inner.config.provider).to_lowercase(),
            state: inner.state.load().as_str().to_string(),
            at: Utc::now(),
        });
        info!(state = %inner.state.load(), "Cache manager initialized");

        Ok(Self { inner })
    }

    /// Subscribe to lifecycle events (operation, health-check, failover)
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Current failover state
    pub fn state(&self) -> FallbackState {
        self.inner.state.load()
    }

    /// Which provider would serve the next operation, if any
    pub fn active_provider(&self) -> Option<ProviderKind> {
        self.inner.active_cache().map(|c| c.kind())
    }

    /// Get a typed value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        let raw = self.inner.op_get(key).await;
        match raw.value {
            Some(value) => match serde_json::from_value::<T>(value) {
                Ok(typed) => CacheResult {
                    success: true,
                    value: Some(typed),
                    from_cache: true,
                    provider: raw.provider,
                    latency: raw.latency,
                    error: None,
                },
                Err(e) => CacheResult::failure(
                    CacheError::Serialization(e.to_string()).to_string(),
                    raw.provider,
                    raw.latency,
                ),
            },
            None => CacheResult {
                success: raw.success,
                value: None,
                from_cache: false,
                provider: raw.provider,
                latency: raw.latency,
                error: raw.error,
            },
        }
    }

    /// Write a typed value; `ttl_seconds` defaults from configuration
    ///
    /// With batching enabled this acknowledges the enqueue; execution
    /// outcome is reported through the `batch-executed` event.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
        metadata: Option<Value>,
    ) -> CacheResult<()> {
        let start = Instant::now();
        if let Err(e) = validate_key(key) {
            return CacheResult::failure(e.to_string(), None, start.elapsed());
        }
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                return CacheResult::failure(
                    CacheError::Serialization(e.to_string()).to_string(),
                    None,
                    start.elapsed(),
                )
            }
        };
        let ttl = ttl_seconds.unwrap_or(self.inner.config.default_ttl_seconds);

        if self.inner.config.optimization.enable_batching {
            return self
                .inner
                .enqueue(BatchOperation::set(key.to_string(), value, Some(ttl), metadata))
                .await;
        }
        self.inner.op_set(key, value, ttl, metadata).await
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let start = Instant::now();
        if let Err(e) = validate_key(key) {
            return CacheResult::failure(e.to_string(), None, start.elapsed());
        }
        if self.inner.config.optimization.enable_batching {
            let ack = self
                .inner
                .enqueue(BatchOperation::delete(key.to_string()))
                .await;
            return CacheResult {
                success: ack.success,
                value: None,
                from_cache: false,
                provider: ack.provider,
                latency: ack.latency,
                error: ack.error,
            };
        }
        self.inner.op_delete(key).await
    }

    /// Check key liveness without touching hit counters or access order
    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.inner.op_exists(key).await
    }

    /// Remove entries matching a glob pattern; `None` clears the namespace
    pub async fn clear(&self, pattern: Option<&str>) -> CacheResult<u64> {
        self.inner.op_clear(pattern).await
    }

    /// Apply `clear` per pattern, best-effort, and sum the counts
    pub async fn invalidate(&self, patterns: &[String]) -> CacheResult<u64> {
        self.inner.op_invalidate(patterns).await
    }

    /// Flush the batch queue now, regardless of size or timer
    pub async fn execute_batch(&self) -> BatchExecutionReport {
        self.inner.flush_batch(FlushTrigger::Manual).await
    }

    /// Combined stats snapshot across both providers
    pub async fn stats(&self) -> ManagerStats {
        let remote = match &self.inner.remote {
            Some(p) => p.stats().await.ok(),
            None => None,
        };
        let memory = match &self.inner.memory {
            Some(p) => p.stats().await.ok(),
            None => None,
        };
        ManagerStats {
            state: self.inner.state.load(),
            active_provider: self.active_provider(),
            remote,
            memory,
        }
    }

    /// Zero both providers' counters
    pub fn reset_stats(&self) {
        if let Some(p) = &self.inner.remote {
            p.stats_recorder().reset();
        }
        if let Some(p) = &self.inner.memory {
            p.stats_recorder().reset();
        }
    }

    /// Operator action: leave permanent fallback and resume reconnect
    /// attempts with a fresh retry budget
    pub fn reset_fallback(&self) {
        if self
            .inner
            .state
            .transition(FallbackState::PermanentFallback, FallbackState::DegradedRetrying)
        {
            info!("Fallback reset, resuming remote reconnect attempts");
            self.inner.retry_attempts.store(0, Ordering::Release);
            self.inner.spawn_retry_loop();
        }
    }

    /// Flush pending writes, cancel all background tasks, and emit the
    /// terminal shutdown event. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutdown_flag.swap(true, Ordering::AcqRel) {
            return;
        }

        // Drain pending writes before tearing anything down
        self.inner.flush_batch(FlushTrigger::Manual).await;

        if let Some(task) = self.inner.retry_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.inner.health_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.inner.batch.lock().timer.take() {
            task.abort();
        }
        if let Some(memory) = &self.inner.memory {
            memory.shutdown();
        }
        if let Some(remote) = &self.inner.remote {
            remote.disconnect();
        }

        self.inner.events.publish(CacheEvent::Shutdown { at: Utc::now() });
        info!("Cache manager shut down");
    }
}

impl ManagerInner {
    /// Select the backend for the next operation
    ///
    /// Remote is returned only when the state machine says ActiveRemote AND
    /// the provider reports itself connected; everything else falls to
    /// memory, or to nothing when no fallback is configured.
    fn active_cache(&self) -> Option<ActiveCache<'_>> {
        match self.state.load() {
            FallbackState::ActiveRemote => {
                if let Some(remote) = &self.remote {
                    if remote.is_connected() {
                        return Some(ActiveCache::Remote(remote));
                    }
                }
                self.memory.as_ref().map(ActiveCache::Memory)
            }
            FallbackState::DegradedRetrying
            | FallbackState::PermanentFallback
            | FallbackState::MemoryOnly => self.memory.as_ref().map(ActiveCache::Memory),
            FallbackState::Unavailable => None,
        }
    }

    fn emit_operation(
        &self,
        op: OperationKind,
        key: &str,
        provider: ProviderKind,
        hit: bool,
        success: bool,
        latency: Duration,
    ) {
        self.events.publish(CacheEvent::Operation {
            op,
            key: key.to_string(),
            provider,
            hit,
            success,
            latency_ms: latency.as_millis() as u64,
            at: Utc::now(),
        });
    }

    /// React to a remote connection-class failure: one transition per
    /// degradation episode, then arm the retry loop (or go dark when no
    /// fallback is configured)
    fn on_remote_failure(self: &Arc<Self>, error: &str) {
        let fallback_available = self.memory.is_some();
        if fallback_available {
            if self
                .state
                .transition(FallbackState::ActiveRemote, FallbackState::DegradedRetrying)
            {
                warn!(error = error, "Remote cache failed, serving from memory while retrying");
                if let Some(remote) = &self.remote {
                    remote.mark_disconnected();
                }
                self.retry_attempts.store(0, Ordering::Release);
                self.events.publish(CacheEvent::RemoteFailure {
                    error: error.to_string(),
                    at: Utc::now(),
                });
                self.spawn_retry_loop();
            }
        } else if self
            .state
            .transition(FallbackState::ActiveRemote, FallbackState::Unavailable)
        {
            warn!(error = error, "Remote cache failed and no fallback is configured");
            if let Some(remote) = &self.remote {
                remote.mark_disconnected();
            }
            self.events.publish(CacheEvent::RemoteFailure {
                error: error.to_string(),
                at: Utc::now(),
            });
        }
    }

    /// Arm the fixed-interval reconnect loop; a single loop per episode
    fn spawn_retry_loop(self: &Arc<Self>) {
        let mut slot = self.retry_task.lock();
        if let Some(task) = &*slot {
            if !task.is_finished() {
                return;
            }
        }

        let weak = Arc::downgrade(self);
        let interval = self.config.fallback.retry_interval();
        let max_retries = self.config.fallback.max_retries;

        *slot = Some(tokio::spawn(async move {
            retry_loop(weak, interval, max_retries).await;
        }));
    }

    fn spawn_health_loop(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.config.health_check.interval();

        *self.health_task.lock() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.shutdown_flag.load(Ordering::Acquire) {
                    return;
                }
                inner.run_health_probe().await;
            }
        }));
    }

    /// Synthetic write-read-delete cycle against the active provider
    ///
    /// Exercises the full data path, catching silent degradation that
    /// `is_connected()` alone cannot see.
    async fn run_health_probe(self: &Arc<Self>) {
        let Some(cache) = self.active_cache() else {
            debug!("Health probe skipped, no active provider");
            return;
        };
        let kind = cache.kind();
        let start = Instant::now();

        let sentinel_key = format!("__health__:{}", Uuid::new_v4());
        let sentinel_value = Value::String(Uuid::new_v4().to_string());

        let probe = async {
            cache
                .set(&sentinel_key, sentinel_value.clone(), 5, None)
                .await?;
            let read_back = cache.get(&sentinel_key).await?;
            cache.delete(&sentinel_key).await?;
            Ok::<bool, CacheError>(read_back.as_ref() == Some(&sentinel_value))
        };

        let healthy = matches!(
            tokio::time::timeout(self.config.health_check.timeout(), probe).await,
            Ok(Ok(true))
        );
        let latency = start.elapsed();

        self.events.publish(CacheEvent::HealthCheck {
            healthy,
            provider: kind,
            latency_ms: latency.as_millis() as u64,
            at: Utc::now(),
        });

        if healthy {
            debug!(provider = %kind, latency_ms = latency.as_millis() as u64, "Health probe ok");
        } else {
            warn!(provider = %kind, "Health probe failed");
            if kind == ProviderKind::Remote {
                self.on_remote_failure("health probe failed");
            }
        }
    }

    async fn op_get(self: &Arc<Self>, key: &str) -> CacheResult<Value> {
        let start = Instant::now();
        if let Err(e) = validate_key(key) {
            return CacheResult::failure(e.to_string(), None, start.elapsed());
        }
        let Some(cache) = self.active_cache() else {
            return CacheResult::failure(
                CacheError::ProviderUnavailable.to_string(),
                None,
                start.elapsed(),
            );
        };

        let mut served_by = cache.kind();
        let mut outcome = cache.get(key).await;

        if let Err(e) = &outcome {
            if served_by == ProviderKind::Remote && e.is_connection_loss() {
                self.on_remote_failure(&e.to_string());
                if let Some(memory) = &self.memory {
                    served_by = ProviderKind::Memory;
                    outcome = memory.get(key).await;
                }
            }
        }

        let latency = start.elapsed();
        match outcome {
            Ok(Some(value)) => {
                self.emit_operation(OperationKind::Get, key, served_by, true, true, latency);
                CacheResult::hit(value, served_by, latency)
            }
            Ok(None) => {
                self.emit_operation(OperationKind::Get, key, served_by, false, true, latency);
                CacheResult::ok(served_by, latency)
            }
            Err(e) => {
                self.emit_operation(OperationKind::Get, key, served_by, false, false, latency);
                CacheResult::failure(e.to_string(), Some(served_by), latency)
            }
        }
    }

    async fn op_set(
        self: &Arc<Self>,
        key: &str,
        value: Value,
        ttl_seconds: u64,
        metadata: Option<Value>,
    ) -> CacheResult<()> {
        let start = Instant::now();
        let Some(cache) = self.active_cache() else {
            return CacheResult::failure(
                CacheError::ProviderUnavailable.to_string(),
                None,
                start.elapsed(),
            );
        };

        let mut served_by = cache.kind();
        let mut outcome = cache
            .set(key, value.clone(), ttl_seconds, metadata.clone())
            .await;

        if let Err(e) = &outcome {
            if served_by == ProviderKind::Remote && e.is_connection_loss() {
                self.on_remote_failure(&e.to_string());
                if let Some(memory) = &self.memory {
                    served_by = ProviderKind::Memory;
                    outcome = memory.set(key, value, ttl_seconds, metadata).await;
                }
            }
        }

        let latency = start.elapsed();
        match outcome {
            Ok(()) => {
                self.emit_operation(OperationKind::Set, key, served_by, false, true, latency);
                CacheResult::ok(served_by, latency)
            }
            Err(e) => {
                self.emit_operation(OperationKind::Set, key, served_by, false, false, latency);
                CacheResult::failure(e.to_string(), Some(served_by), latency)
            }
        }
    }

    async fn op_delete(self: &Arc<Self>, key: &str) -> CacheResult<bool> {
        let start = Instant::now();
        let Some(cache) = self.active_cache() else {
            return CacheResult::failure(
                CacheError::ProviderUnavailable.to_string(),
                None,
                start.elapsed(),
            );
        };

        let mut served_by = cache.kind();
        let mut outcome = cache.delete(key).await;

        if let Err(e) = &outcome {
            if served_by == ProviderKind::Remote && e.is_connection_loss() {
                self.on_remote_failure(&e.to_string());
                if let Some(memory) = &self.memory {
                    served_by = ProviderKind::Memory;
                    outcome = memory.delete(key).await;
                }
            }
        }

        let latency = start.elapsed();
        match outcome {
            Ok(was_present) => {
                self.emit_operation(OperationKind::Delete, key, served_by, false, true, latency);
                CacheResult {
                    value: Some(was_present),
                    ..CacheResult::ok(served_by, latency)
                }
            }
            Err(e) => {
                self.emit_operation(OperationKind::Delete, key, served_by, false, false, latency);
                CacheResult::failure(e.to_string(), Some(served_by), latency)
            }
        }
    }

    async fn op_exists(self: &Arc<Self>, key: &str) -> CacheResult<bool> {
        let start = Instant::now();
        if let Err(e) = validate_key(key) {
            return CacheResult::failure(e.to_string(), None, start.elapsed());
        }
        let Some(cache) = self.active_cache() else {
            return CacheResult::failure(
                CacheError::ProviderUnavailable.to_string(),
                None,
                start.elapsed(),
            );
        };

        let mut served_by = cache.kind();
        let mut outcome = cache.exists(key).await;

        if let Err(e) = &outcome {
            if served_by == ProviderKind::Remote && e.is_connection_loss() {
                self.on_remote_failure(&e.to_string());
                if let Some(memory) = &self.memory {
                    served_by = ProviderKind::Memory;
                    outcome = memory.exists(key).await;
                }
            }
        }

        let latency = start.elapsed();
        match outcome {
            Ok(present) => {
                self.emit_operation(OperationKind::Exists, key, served_by, false, true, latency);
                CacheResult {
                    value: Some(present),
                    ..CacheResult::ok(served_by, latency)
                }
            }
            Err(e) => {
                self.emit_operation(OperationKind::Exists, key, served_by, false, false, latency);
                CacheResult::failure(e.to_string(), Some(served_by), latency)
            }
        }
    }

    async fn op_clear(self: &Arc<Self>, pattern: Option<&str>) -> CacheResult<u64> {
        let start = Instant::now();
        let Some(cache) = self.active_cache() else {
            return CacheResult::failure(
                CacheError::ProviderUnavailable.to_string(),
                None,
                start.elapsed(),
            );
        };

        let served_by = cache.kind();
        let outcome = cache.clear(pattern).await;
        let latency = start.elapsed();
        let key_label = pattern.unwrap_or("*");

        match outcome {
            Ok(removed) => {
                self.emit_operation(OperationKind::Clear, key_label, served_by, false, true, latency);
                CacheResult {
                    value: Some(removed),
                    ..CacheResult::ok(served_by, latency)
                }
            }
            Err(e) => {
                if served_by == ProviderKind::Remote && e.is_connection_loss() {
                    self.on_remote_failure(&e.to_string());
                }
                self.emit_operation(OperationKind::Clear, key_label, served_by, false, false, latency);
                CacheResult::failure(e.to_string(), Some(served_by), latency)
            }
        }
    }

    async fn op_invalidate(self: &Arc<Self>, patterns: &[String]) -> CacheResult<u64> {
        let start = Instant::now();
        let Some(cache) = self.active_cache() else {
            return CacheResult::failure(
                CacheError::ProviderUnavailable.to_string(),
                None,
                start.elapsed(),
            );
        };

        let served_by = cache.kind();
        // Best-effort by contract: individual pattern failures are skipped
        // inside the provider, so this only fails if nothing is reachable
        let outcome = cache.invalidate(patterns).await;
        let latency = start.elapsed();

        match outcome {
            Ok(total) => {
                self.emit_operation(
                    OperationKind::Invalidate,
                    &patterns.join(","),
                    served_by,
                    false,
                    true,
                    latency,
                );
                CacheResult {
                    value: Some(total),
                    ..CacheResult::ok(served_by, latency)
                }
            }
            Err(e) => {
                if served_by == ProviderKind::Remote && e.is_connection_loss() {
                    self.on_remote_failure(&e.to_string());
                }
                CacheResult::failure(e.to_string(), Some(served_by), latency)
            }
        }
    }

    /// Append to the batch queue, arming the flush timer on the first entry
    /// and flushing inline when the size threshold is reached
    async fn enqueue(self: &Arc<Self>, op: BatchOperation) -> CacheResult<()> {
        let start = Instant::now();
        let provider = self.active_cache().map(|c| c.kind());

        let flush_now = {
            let mut batch = self.batch.lock();
            batch.ops.push_back(op);
            if batch.ops.len() >= self.config.optimization.batch_size {
                true
            } else {
                if batch.timer.is_none() {
                    let weak = Arc::downgrade(self);
                    let timeout = self.config.optimization.batch_timeout();
                    batch.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        if let Some(inner) = weak.upgrade() {
                            inner.flush_batch(FlushTrigger::Timer).await;
                        }
                    }));
                }
                false
            }
        };

        if flush_now {
            self.flush_batch(FlushTrigger::Size).await;
        }

        // The enqueue itself is the acknowledged operation; execution
        // outcome is reported via the batch-executed event
        CacheResult {
            success: true,
            value: None,
            from_cache: false,
            provider,
            latency: start.elapsed(),
            error: None,
        }
    }

    /// Drain the queue under the lock, then execute in FIFO order outside it
    async fn flush_batch(self: &Arc<Self>, trigger: FlushTrigger) -> BatchExecutionReport {
        let (ops, timer) = {
            let mut batch = self.batch.lock();
            (std::mem::take(&mut batch.ops), batch.timer.take())
        };
        if let Some(timer) = timer {
            // The timer task cannot abort itself; for other triggers the
            // pending timer must not fire against the next queue generation
            if trigger != FlushTrigger::Timer {
                timer.abort();
            }
        }
        if ops.is_empty() {
            return BatchExecutionReport::empty();
        }

        let Some(cache) = self.active_cache() else {
            warn!(dropped = ops.len(), "Batch flush with no active provider, all operations failed");
            let results: Vec<BatchOpResult> = ops
                .into_iter()
                .map(|op| BatchOpResult {
                    op: op.op,
                    key: op.key,
                    success: false,
                    error: Some(CacheError::ProviderUnavailable.to_string()),
                })
                .collect();
            let failed = results.len();
            return BatchExecutionReport {
                executed: failed,
                succeeded: 0,
                failed,
                provider: None,
                results,
            };
        };

        let kind = cache.kind();
        let default_ttl = self.config.default_ttl_seconds;
        let mut results = Vec::with_capacity(ops.len());
        let mut failover_triggered = false;

        for op in ops {
            let outcome = match op.op {
                BatchOpKind::Set => {
                    let value = op.value.clone().unwrap_or(Value::Null);
                    let ttl = op.ttl_seconds.unwrap_or(default_ttl);
                    cache.set(&op.key, value, ttl, op.metadata.clone()).await.map(|_| ())
                }
                BatchOpKind::Delete => cache.delete(&op.key).await.map(|_| ()),
                BatchOpKind::Get => cache.get(&op.key).await.map(|_| ()),
            };

            match outcome {
                Ok(()) => results.push(BatchOpResult {
                    op: op.op,
                    key: op.key,
                    success: true,
                    error: None,
                }),
                Err(e) => {
                    if !failover_triggered && kind == ProviderKind::Remote && e.is_connection_loss()
                    {
                        failover_triggered = true;
                        self.on_remote_failure(&e.to_string());
                    }
                    results.push(BatchOpResult {
                        op: op.op,
                        key: op.key,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;

        debug!(
            trigger = ?trigger,
            executed = results.len(),
            succeeded = succeeded,
            failed = failed,
            provider = %kind,
            "Batch flush executed"
        );
        self.events.publish(CacheEvent::BatchExecuted {
            size: results.len(),
            succeeded,
            failed,
            provider: kind,
            at: Utc::now(),
        });

        BatchExecutionReport {
            executed: results.len(),
            succeeded,
            failed,
            provider: Some(kind),
            results,
        }
    }
}

/// Fixed-delay reconnect loop, bounded by the retry budget
///
/// One terminal outcome per episode: either recovery (state back to
/// ActiveRemote, counter reset) or exhaustion (PermanentFallback and a
/// single `remote-retry-exhausted` event).
async fn retry_loop(weak: Weak<ManagerInner>, interval: Duration, max_retries: u32) {
    loop {
        tokio::time::sleep(interval).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.shutdown_flag.load(Ordering::Acquire)
            || inner.state.load() != FallbackState::DegradedRetrying
        {
            return;
        }
        let Some(remote) = &inner.remote else {
            return;
        };

        let attempt = inner.retry_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        match remote.reconnect().await {
            Ok(()) => {
                inner.retry_attempts.store(0, Ordering::Release);
                inner
                    .state
                    .transition(FallbackState::DegradedRetrying, FallbackState::ActiveRemote);
                info!(attempts = attempt, "Remote cache reconnected, resuming remote serving");
                inner.events.publish(CacheEvent::RemoteReconnected {
                    attempts: attempt,
                    at: Utc::now(),
                });
                return;
            }
            Err(e) => {
                warn!(
                    attempt = attempt,
                    max_retries = max_retries,
                    error = %e,
                    "Remote reconnect attempt failed"
                );
                if attempt >= max_retries {
                    inner.state.transition(
                        FallbackState::DegradedRetrying,
                        FallbackState::PermanentFallback,
                    );
                    warn!(attempts = attempt, "Remote retry budget exhausted, staying on memory");
                    inner.events.publish(CacheEvent::RemoteRetryExhausted {
                        attempts: attempt,
                        at: Utc::now(),
                    });
                    return;
                }
            }
        }
    }
}
