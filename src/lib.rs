#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, SETEX in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Cache Manager
//!
//! Unified cache abstraction that transparently serves reads and writes
//! from a shared Redis backend while guaranteeing availability through
//! automatic fallback to a bounded in-process memory cache.
//!
//! ## Overview
//!
//! External callers talk to one component - [`CacheManager`] - which
//! selects the active provider, runs the failover/retry state machine,
//! batches writes when configured, and probes end-to-end health on an
//! interval. Every read/write/delete returns the uniform, non-throwing
//! [`CacheResult`]; degraded mode is silent to callers and observable to
//! operators through the emitted event stream.
//!
//! ## Module Organization
//!
//! - [`manager`] - orchestrator: provider selection, failover, batching,
//!   health checks
//! - [`providers`] - the memory and remote (Redis) backends
//! - [`provider`] - the operation contract every backend implements
//! - [`metrics`] - passive event consumer with rolling stats, trends, and a
//!   composite health score
//! - [`events`] - broadcast event publisher and event types
//! - [`config`] - configuration surface with validation
//! - [`codec`] - pluggable value encoding for the remote wire format
//! - [`pattern`] - `*`/`?` glob matching shared by both backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cache_manager::{CacheManager, CacheManagerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CacheManager::initialize(CacheManagerConfig::default()).await?;
//!
//! manager.set("user:1", &serde_json::json!({"name": "ada"}), Some(300), None).await;
//! let user = manager.get::<serde_json::Value>("user:1").await;
//! if user.from_cache {
//!     println!("hit from {:?}: {:?}", user.provider, user.value);
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod pattern;
pub mod provider;
pub mod providers;
pub mod types;

pub use codec::{JsonCodec, ValueCodec};
pub use config::{
    CacheManagerConfig, EvictionPolicy, FallbackConfig, FallbackStrategy, HealthCheckConfig,
    MemoryCacheConfig, OptimizationConfig, ProviderMode, RemoteCacheConfig,
};
pub use errors::{CacheError, ProviderResult};
pub use events::{CacheEvent, CacheEventPublisher, OperationKind};
pub use logging::init_logging;
pub use manager::{BatchExecutionReport, CacheManager, FallbackState, ManagerStats};
pub use metrics::{CacheMetrics, HealthReport, MetricsConfig, MetricsSnapshot, TrendDirection};
pub use provider::CacheStore;
pub use providers::{MemoryCacheProvider, RemoteCacheProvider};
pub use types::{BatchOperation, CacheEntry, CacheResult, CacheStats, ProviderKind};
