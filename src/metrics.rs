//! # Cache Metrics
//!
//! Passive subscriber to cache manager events. Aggregates a bounded rolling
//! operation log, a bounded per-key hit/miss table, and a periodically
//! sampled trend series, and derives a composite 0-100 health score with
//! threshold-breach alerts.
//!
//! Metrics own only derived data - they never mutate cache state, and the
//! manager never depends on them. Construct explicitly and feed with
//! `observe(manager.subscribe())` so tests can substitute their own event
//! streams instead of a shared global collector.

use crate::events::{CacheEvent, OperationKind};
use crate::types::ProviderKind;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

/// Tunables for aggregation bounds and alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Hard cap on the rolling operation log; oldest entries drop past it
    pub operation_log_cap: usize,
    /// Cap on the per-key table; least-recently-seen keys evicted past it
    pub key_table_cap: usize,
    /// Trend sampling cadence
    pub sample_interval_ms: u64,
    /// Points per comparison window; trend analysis needs two full windows
    pub trend_window: usize,
    /// Cap on retained trend points
    pub trend_points_cap: usize,
    pub latency_warn_ms: f64,
    pub latency_critical_ms: f64,
    pub error_rate_warn: f64,
    pub error_rate_critical: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            operation_log_cap: 1_000,
            key_table_cap: 500,
            sample_interval_ms: 60_000,
            trend_window: 5,
            trend_points_cap: 120,
            latency_warn_ms: 100.0,
            latency_critical_ms: 500.0,
            error_rate_warn: 0.05,
            error_rate_critical: 0.25,
        }
    }
}

impl MetricsConfig {
    /// Small caps and a fast sampling cadence for tests
    pub fn for_test() -> Self {
        Self {
            operation_log_cap: 50,
            key_table_cap: 10,
            sample_interval_ms: 50,
            trend_window: 2,
            trend_points_cap: 20,
            ..Self::default()
        }
    }
}

/// One entry of the rolling operation log
#[derive(Debug, Clone, Serialize)]
pub struct OperationSample {
    pub op: OperationKind,
    pub key: String,
    pub provider: ProviderKind,
    pub hit: bool,
    pub success: bool,
    pub latency_ms: u64,
    pub at: DateTime<Utc>,
}

/// Per-key hit/miss accounting
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyStats {
    pub hits: u64,
    pub misses: u64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One sampled point of the trend series
#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
    pub volume: u64,
    pub at: DateTime<Utc>,
}

/// Direction of a metric between the two most recent windows
///
/// For volume, `Improving` means traffic is growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
}

/// Moving-average comparison of the recent window against the one before it
#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    pub hit_rate: TrendDirection,
    pub latency: TrendDirection,
    pub volume: TrendDirection,
    pub recent_hit_rate: f64,
    pub previous_hit_rate: f64,
    pub recent_avg_latency_ms: f64,
    pub previous_avg_latency_ms: f64,
    pub recent_volume: f64,
    pub previous_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A threshold breach surfaced alongside the health score
#[derive(Debug, Clone, Serialize)]
pub struct HealthAlert {
    pub severity: AlertSeverity,
    pub component: &'static str,
    pub message: String,
}

/// Composite health score: four independent 0-100 components averaged
/// unweighted
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub availability: f64,
    pub performance: f64,
    pub efficiency: f64,
    pub reliability: f64,
    pub overall: f64,
    pub alerts: Vec<HealthAlert>,
}

/// Aggregated snapshot for dashboards and logging
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_operations: u64,
    pub hit_rate: f64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub tracked_keys: usize,
    pub failovers: u64,
    pub recoveries: u64,
    pub health: HealthReport,
    pub trend: Option<TrendReport>,
}

impl MetricsSnapshot {
    /// Format for logging
    pub fn format_summary(&self) -> String {
        format!(
            "Health: {:.0}/100 | Ops: {} | Hit rate: {:.1}% | Errors: {:.1}% | Avg latency: {:.2}ms",
            self.health.overall,
            self.total_operations,
            self.hit_rate * 100.0,
            self.error_rate * 100.0,
            self.avg_latency_ms
        )
    }
}

#[derive(Default)]
struct Totals {
    operations: u64,
    reads: u64,
    read_hits: u64,
    errors: u64,
    latency_sum_ms: u64,
    failovers: u64,
    recoveries: u64,
}

#[derive(Default)]
struct WindowAccumulator {
    operations: u64,
    reads: u64,
    read_hits: u64,
    latency_sum_ms: u64,
}

struct MetricsState {
    operations: VecDeque<OperationSample>,
    keys: HashMap<String, KeyStats>,
    trend: VecDeque<TrendPoint>,
    window: WindowAccumulator,
    totals: Totals,
}

struct MetricsInner {
    config: MetricsConfig,
    state: Mutex<MetricsState>,
    manager_initialized: AtomicBool,
    last_health_ok: AtomicBool,
}

/// Passive metrics aggregator over the manager's event stream
pub struct CacheMetrics {
    inner: Arc<MetricsInner>,
    consumer_task: Mutex<Option<JoinHandle<()>>>,
    sampler_task: Mutex<Option<JoinHandle<()>>>,
}

impl CacheMetrics {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                config,
                state: Mutex::new(MetricsState {
                    operations: VecDeque::new(),
                    keys: HashMap::new(),
                    trend: VecDeque::new(),
                    window: WindowAccumulator::default(),
                    totals: Totals::default(),
                }),
                manager_initialized: AtomicBool::new(false),
                last_health_ok: AtomicBool::new(true),
            }),
            consumer_task: Mutex::new(None),
            sampler_task: Mutex::new(None),
        }
    }

    /// Start consuming an event stream and sampling the trend series
    ///
    /// Dropped (lagged) broadcast messages are skipped, not fatal.
    pub fn observe(&self, mut receiver: broadcast::Receiver<CacheEvent>) {
        let inner = Arc::clone(&self.inner);
        *self.consumer_task.lock() = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => inner.handle_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped = skipped, "Metrics consumer lagged, skipping events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }));

        let inner = Arc::clone(&self.inner);
        let interval = std::time::Duration::from_millis(self.inner.config.sample_interval_ms);
        *self.sampler_task.lock() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.sample_trend_point();
            }
        }));
    }

    /// Stop the consumer and sampler tasks
    pub fn stop(&self) {
        if let Some(task) = self.consumer_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.sampler_task.lock().take() {
            task.abort();
        }
    }

    /// Aggregated snapshot including health score and trend comparison
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.state.lock();
        let totals = &state.totals;

        let hit_rate = if totals.reads > 0 {
            totals.read_hits as f64 / totals.reads as f64
        } else {
            0.0
        };
        let error_rate = if totals.operations > 0 {
            totals.errors as f64 / totals.operations as f64
        } else {
            0.0
        };
        let avg_latency_ms = if totals.operations > 0 {
            totals.latency_sum_ms as f64 / totals.operations as f64
        } else {
            0.0
        };

        let health = self
            .inner
            .health_report(hit_rate, error_rate, avg_latency_ms);
        let trend = self.inner.trend_report(&state.trend);

        MetricsSnapshot {
            total_operations: totals.operations,
            hit_rate,
            error_rate,
            avg_latency_ms,
            tracked_keys: state.keys.len(),
            failovers: totals.failovers,
            recoveries: totals.recoveries,
            health,
            trend,
        }
    }

    /// Health score and alerts only
    pub fn health_report(&self) -> HealthReport {
        self.snapshot().health
    }

    /// Trend comparison, once two full windows have been sampled
    pub fn trend_report(&self) -> Option<TrendReport> {
        let state = self.inner.state.lock();
        self.inner.trend_report(&state.trend)
    }

    /// Per-key stats, if the key is still tracked
    pub fn key_stats(&self, key: &str) -> Option<KeyStats> {
        self.inner.state.lock().keys.get(key).cloned()
    }

    /// The `n` most-hit tracked keys, descending
    pub fn hot_keys(&self, n: usize) -> Vec<(String, KeyStats)> {
        let state = self.inner.state.lock();
        let mut keys: Vec<(String, KeyStats)> = state
            .keys
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        keys.sort_by(|a, b| b.1.hits.cmp(&a.1.hits));
        keys.truncate(n);
        keys
    }

    /// Recent operations, newest last
    pub fn recent_operations(&self, n: usize) -> Vec<OperationSample> {
        let state = self.inner.state.lock();
        state
            .operations
            .iter()
            .rev()
            .take(n)
            .rev()
            .cloned()
            .collect()
    }

    /// Force a trend sample outside the timer cadence (used by tests)
    pub fn sample_now(&self) {
        self.inner.sample_trend_point();
    }
}

impl MetricsInner {
    fn handle_event(&self, event: CacheEvent) {
        match event {
            CacheEvent::Initialized { .. } => {
                self.manager_initialized.store(true, Ordering::Release);
            }
            CacheEvent::Shutdown { .. } => {
                self.manager_initialized.store(false, Ordering::Release);
            }
            CacheEvent::HealthCheck { healthy, .. } => {
                self.last_health_ok.store(healthy, Ordering::Release);
            }
            CacheEvent::RemoteFailure { .. } => {
                self.state.lock().totals.failovers += 1;
            }
            CacheEvent::RemoteReconnected { .. } => {
                self.state.lock().totals.recoveries += 1;
            }
            CacheEvent::RemoteRetryExhausted { .. } | CacheEvent::BatchExecuted { .. } => {}
            CacheEvent::Operation {
                op,
                key,
                provider,
                hit,
                success,
                latency_ms,
                at,
            } => {
                let mut state = self.state.lock();

                state.operations.push_back(OperationSample {
                    op,
                    key: key.clone(),
                    provider,
                    hit,
                    success,
                    latency_ms,
                    at,
                });
                while state.operations.len() > self.config.operation_log_cap {
                    state.operations.pop_front();
                }

                state.totals.operations += 1;
                state.totals.latency_sum_ms += latency_ms;
                state.window.operations += 1;
                state.window.latency_sum_ms += latency_ms;
                if !success {
                    state.totals.errors += 1;
                }
                if op == OperationKind::Get {
                    state.totals.reads += 1;
                    state.window.reads += 1;
                    if hit {
                        state.totals.read_hits += 1;
                        state.window.read_hits += 1;
                    }

                    let entry = state.keys.entry(key).or_default();
                    if hit {
                        entry.hits += 1;
                    } else {
                        entry.misses += 1;
                    }
                    entry.last_seen = Some(at);
                    self.evict_stale_keys(&mut state);
                }
            }
        }
    }

    /// Drop least-recently-seen keys past the configured cap
    fn evict_stale_keys(&self, state: &mut MetricsState) {
        while state.keys.len() > self.config.key_table_cap {
            let stalest = state
                .keys
                .iter()
                .min_by_key(|(_, v)| v.last_seen)
                .map(|(k, _)| k.clone());
            match stalest {
                Some(key) => {
                    state.keys.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Close the current accumulation window into a trend point
    fn sample_trend_point(&self) {
        let mut state = self.state.lock();
        let window = std::mem::take(&mut state.window);

        let hit_rate = if window.reads > 0 {
            window.read_hits as f64 / window.reads as f64
        } else {
            0.0
        };
        let avg_latency_ms = if window.operations > 0 {
            window.latency_sum_ms as f64 / window.operations as f64
        } else {
            0.0
        };

        state.trend.push_back(TrendPoint {
            hit_rate,
            avg_latency_ms,
            volume: window.operations,
            at: Utc::now(),
        });
        while state.trend.len() > self.config.trend_points_cap {
            state.trend.pop_front();
        }
    }

    fn trend_report(&self, trend: &VecDeque<TrendPoint>) -> Option<TrendReport> {
        let window = self.config.trend_window;
        if window == 0 || trend.len() < window * 2 {
            return None;
        }

        let points: Vec<&TrendPoint> = trend.iter().collect();
        let split = points.len() - window;
        let recent = &points[split..];
        let previous = &points[split - window..split];

        let avg = |slice: &[&TrendPoint], f: fn(&TrendPoint) -> f64| -> f64 {
            slice.iter().map(|p| f(p)).sum::<f64>() / slice.len() as f64
        };

        let recent_hit_rate = avg(recent, |p| p.hit_rate);
        let previous_hit_rate = avg(previous, |p| p.hit_rate);
        let recent_latency = avg(recent, |p| p.avg_latency_ms);
        let previous_latency = avg(previous, |p| p.avg_latency_ms);
        let recent_volume = avg(recent, |p| p.volume as f64);
        let previous_volume = avg(previous, |p| p.volume as f64);

        Some(TrendReport {
            hit_rate: direction(recent_hit_rate, previous_hit_rate, true),
            latency: direction(recent_latency, previous_latency, false),
            volume: direction(recent_volume, previous_volume, true),
            recent_hit_rate,
            previous_hit_rate,
            recent_avg_latency_ms: recent_latency,
            previous_avg_latency_ms: previous_latency,
            recent_volume,
            previous_volume,
        })
    }

    fn health_report(&self, hit_rate: f64, error_rate: f64, avg_latency_ms: f64) -> HealthReport {
        let mut alerts = Vec::new();

        // Availability: is the manager up, and did the last probe pass
        let initialized = self.manager_initialized.load(Ordering::Acquire);
        let probe_ok = self.last_health_ok.load(Ordering::Acquire);
        let availability = if !initialized {
            alerts.push(HealthAlert {
                severity: AlertSeverity::Critical,
                component: "availability",
                message: "cache manager is not initialized".to_string(),
            });
            0.0
        } else if !probe_ok {
            alerts.push(HealthAlert {
                severity: AlertSeverity::Warning,
                component: "availability",
                message: "last health probe failed".to_string(),
            });
            50.0
        } else {
            100.0
        };

        // Performance: penalized above the latency thresholds
        let performance = graded_score(
            avg_latency_ms,
            self.config.latency_warn_ms,
            self.config.latency_critical_ms,
        );
        if avg_latency_ms > self.config.latency_critical_ms {
            alerts.push(HealthAlert {
                severity: AlertSeverity::Critical,
                component: "performance",
                message: format!("average latency {avg_latency_ms:.1}ms exceeds critical threshold"),
            });
        } else if avg_latency_ms > self.config.latency_warn_ms {
            alerts.push(HealthAlert {
                severity: AlertSeverity::Warning,
                component: "performance",
                message: format!("average latency {avg_latency_ms:.1}ms exceeds warning threshold"),
            });
        }

        // Efficiency: hit rate as a percentage
        let efficiency = (hit_rate * 100.0).clamp(0.0, 100.0);

        // Reliability: penalized above the error-rate thresholds
        let reliability = graded_score(
            error_rate,
            self.config.error_rate_warn,
            self.config.error_rate_critical,
        );
        if error_rate > self.config.error_rate_critical {
            alerts.push(HealthAlert {
                severity: AlertSeverity::Critical,
                component: "reliability",
                message: format!(
                    "error rate {:.1}% exceeds critical threshold",
                    error_rate * 100.0
                ),
            });
        } else if error_rate > self.config.error_rate_warn {
            alerts.push(HealthAlert {
                severity: AlertSeverity::Warning,
                component: "reliability",
                message: format!(
                    "error rate {:.1}% exceeds warning threshold",
                    error_rate * 100.0
                ),
            });
        }

        let overall = (availability + performance + efficiency + reliability) / 4.0;

        HealthReport {
            availability,
            performance,
            efficiency,
            reliability,
            overall,
            alerts,
        }
    }
}

/// 100 at or below `warn`, linear to 50 at `critical`, linear to 0 at twice
/// `critical`
fn graded_score(value: f64, warn: f64, critical: f64) -> f64 {
    if value <= warn {
        100.0
    } else if value <= critical {
        let span = (critical - warn).max(f64::EPSILON);
        100.0 - 50.0 * (value - warn) / span
    } else {
        let overshoot = (value - critical) / critical.max(f64::EPSILON);
        (50.0 - 50.0 * overshoot).max(0.0)
    }
}

/// Compare moving averages with a 5% relative tolerance band
fn direction(recent: f64, previous: f64, higher_is_better: bool) -> TrendDirection {
    let base = previous.abs().max(f64::EPSILON);
    let delta = (recent - previous) / base;
    if delta.abs() <= 0.05 {
        TrendDirection::Stable
    } else if (delta > 0.0) == higher_is_better {
        TrendDirection::Improving
    } else {
        TrendDirection::Degrading
    }
}
