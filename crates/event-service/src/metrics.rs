//! Performance counters and metrics hooks
//!
//! `PerformanceCounters` is the per-instance running tally exposed through
//! `performance_metrics()`. `MetricsRecorder` is the injected sink for an
//! external metrics system (see `bridge-telemetry` for a Prometheus one).
//!
//! ## Usage
//!
//! ```ignore
//! use event_service::metrics::PerformanceCounters;
//!
//! let counters = PerformanceCounters::new();
//! counters.record_send(Duration::from_micros(40));
//! assert_eq!(counters.snapshot().messages_sent, 1);
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use shared_types::ErrorCode;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Running counters of one event service instance.
///
/// Initialised at construction, reset only by `reset()`.
pub struct PerformanceCounters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    /// Cumulative bridge send latency in nanoseconds
    total_latency_ns: AtomicU64,
    error_count: AtomicU64,
    started: Mutex<(Instant, DateTime<Utc>)>,
}

impl PerformanceCounters {
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            total_latency_ns: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            started: Mutex::new((Instant::now(), Utc::now())),
        }
    }

    /// Record a successful send and the time the bridge took.
    pub fn record_send(&self, latency: Duration) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn record_receive(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Current values. `average_latency` is zero before the first send.
    pub fn snapshot(&self) -> PerformanceMetrics {
        let messages_sent = self.messages_sent.load(Ordering::Relaxed);
        let total_latency = Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed));
        let average_latency = if messages_sent > 0 {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / messages_sent)
        } else {
            Duration::ZERO
        };
        let (started, started_at) = *self.started.lock();

        PerformanceMetrics {
            messages_sent,
            messages_received: self.messages_received.load(Ordering::Relaxed),
            total_latency,
            average_latency,
            error_count: self.error_count.load(Ordering::Relaxed),
            started_at,
            uptime: started.elapsed(),
        }
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        self.messages_sent.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.total_latency_ns.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        *self.started.lock() = (Instant::now(), Utc::now());
    }
}

impl Default for PerformanceCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counters snapshot
#[derive(Clone, Debug, Serialize)]
pub struct PerformanceMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub total_latency: Duration,
    /// `total_latency / messages_sent`, zero when nothing was sent
    pub average_latency: Duration,
    pub error_count: u64,
    pub started_at: DateTime<Utc>,
    pub uptime: Duration,
}

/// Connection state of an event service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Uninitialized,
    Connected,
}

/// Read-only view of a service instance for dashboards.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStats {
    pub plugin_id: String,
    pub module_id: String,
    pub state: ConnectionState,
    /// Whether the bridge is still alive
    pub bridge_available: bool,
    pub subscriptions: usize,
    /// Buffered envelopes per channel
    pub queued: BTreeMap<String, usize>,
    pub max_queue_size: usize,
    pub performance: PerformanceMetrics,
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to integrate with external metrics systems
/// like Prometheus or StatsD.
pub trait MetricsRecorder: Send + Sync {
    /// A send to `target` completed in `latency`
    fn record_send(&self, target: &str, latency: Duration);

    /// A message was delivered to a subscriber of `module_id`
    fn record_receive(&self, module_id: &str);

    /// An operation failed with `code`
    fn record_error(&self, module_id: &str, code: ErrorCode);

    /// `delivered` backlog entries were replayed to a new subscriber
    fn record_replay(&self, module_id: &str, delivered: usize);

    /// `evicted` entries were dropped from a full channel
    fn record_eviction(&self, channel: &str, evicted: usize);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_send(&self, _: &str, _: Duration) {}
    fn record_receive(&self, _: &str) {}
    fn record_error(&self, _: &str, _: ErrorCode) {}
    fn record_replay(&self, _: &str, _: usize) {}
    fn record_eviction(&self, _: &str, _: usize) {}
}
