//! Cache lifecycle event publishing
//!
//! The manager emits events for every operation, health probe, and failover
//! transition; consumers (metrics, telemetry) subscribe to the broadcast
//! channel rather than relying on a global event bus. Publishing with zero
//! subscribers is acceptable and silently succeeds.

use crate::types::{BatchOpKind, ProviderKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Which manager operation an `Operation` event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Set,
    Delete,
    Exists,
    Clear,
    Invalidate,
}

impl From<BatchOpKind> for OperationKind {
    fn from(op: BatchOpKind) -> Self {
        match op {
            BatchOpKind::Get => OperationKind::Get,
            BatchOpKind::Set => OperationKind::Set,
            BatchOpKind::Delete => OperationKind::Delete,
        }
    }
}

/// Events emitted by the cache manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum CacheEvent {
    /// Manager finished initialization
    Initialized {
        provider_mode: String,
        state: String,
        at: DateTime<Utc>,
    },

    /// A read/write/delete/exists/clear/invalidate completed
    Operation {
        op: OperationKind,
        key: String,
        provider: ProviderKind,
        hit: bool,
        success: bool,
        latency_ms: u64,
        at: DateTime<Utc>,
    },

    /// A health probe round-trip completed
    HealthCheck {
        healthy: bool,
        provider: ProviderKind,
        latency_ms: u64,
        at: DateTime<Utc>,
    },

    /// The remote backend became unreachable; serving from memory
    RemoteFailure { error: String, at: DateTime<Utc> },

    /// Reconnect succeeded; serving from remote again
    RemoteReconnected { attempts: u32, at: DateTime<Utc> },

    /// Retry budget exhausted; memory-only until externally reset
    RemoteRetryExhausted { attempts: u32, at: DateTime<Utc> },

    /// A batch flush executed
    BatchExecuted {
        size: usize,
        succeeded: usize,
        failed: usize,
        provider: ProviderKind,
        at: DateTime<Utc>,
    },

    /// Manager shut down; background tasks cancelled
    Shutdown { at: DateTime<Utc> },
}

impl CacheEvent {
    /// Short event name matching the wire-level `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::Initialized { .. } => "initialized",
            CacheEvent::Operation { .. } => "operation",
            CacheEvent::HealthCheck { .. } => "health-check",
            CacheEvent::RemoteFailure { .. } => "remote-failure",
            CacheEvent::RemoteReconnected { .. } => "remote-reconnected",
            CacheEvent::RemoteRetryExhausted { .. } => "remote-retry-exhausted",
            CacheEvent::BatchExecuted { .. } => "batch-executed",
            CacheEvent::Shutdown { .. } => "shutdown",
        }
    }
}

/// High-throughput event publisher for cache lifecycle events
#[derive(Debug, Clone)]
pub struct CacheEventPublisher {
    sender: broadcast::Sender<CacheEvent>,
}

impl CacheEventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: CacheEvent) {
        // A send error means there are no subscribers, which is acceptable -
        // the cache keeps emitting whether or not anyone is listening
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for CacheEventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
