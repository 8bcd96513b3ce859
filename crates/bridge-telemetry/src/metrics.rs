//! Prometheus metrics for the event bridge.
//!
//! All metrics follow the naming convention: `eb_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: sends, receives, errors, replayed and evicted entries
//! - **Histogram**: bridge send latency per target

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use shared_types::ErrorCode;
use std::sync::Arc;
use std::time::Duration;

use event_service::MetricsRecorder;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    static ref GLOBAL_RECORDER: Result<Arc<PrometheusRecorder>, String> =
        PrometheusRecorder::register(&REGISTRY)
            .map(Arc::new)
            .map_err(|e| e.to_string());
}

/// `MetricsRecorder` backed by Prometheus collectors.
pub struct PrometheusRecorder {
    messages_sent: CounterVec,
    messages_received: CounterVec,
    send_latency: HistogramVec,
    errors: CounterVec,
    replayed: CounterVec,
    evicted: CounterVec,
}

impl PrometheusRecorder {
    /// Create the collectors and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, TelemetryError> {
        let recorder = Self {
            messages_sent: CounterVec::new(
                Opts::new("eb_messages_sent_total", "Messages accepted by the bridge"),
                &["target"],
            )?,
            messages_received: CounterVec::new(
                Opts::new(
                    "eb_messages_received_total",
                    "Messages delivered to subscribers, replay included",
                ),
                &["module"],
            )?,
            send_latency: HistogramVec::new(
                HistogramOpts::new(
                    "eb_send_latency_seconds",
                    "Time the bridge took to accept a message",
                )
                .buckets(exponential_buckets(0.00001, 2.0, 16)?),
                &["target"],
            )?,
            errors: CounterVec::new(
                Opts::new("eb_errors_total", "Failed operations by error code"),
                &["module", "code"],
            )?,
            replayed: CounterVec::new(
                Opts::new(
                    "eb_replayed_messages_total",
                    "Backlog entries replayed to new persistent subscribers",
                ),
                &["module"],
            )?,
            evicted: CounterVec::new(
                Opts::new(
                    "eb_evicted_messages_total",
                    "Entries dropped from full replay channels",
                ),
                &["channel"],
            )?,
        };

        registry.register(Box::new(recorder.messages_sent.clone()))?;
        registry.register(Box::new(recorder.messages_received.clone()))?;
        registry.register(Box::new(recorder.send_latency.clone()))?;
        registry.register(Box::new(recorder.errors.clone()))?;
        registry.register(Box::new(recorder.replayed.clone()))?;
        registry.register(Box::new(recorder.evicted.clone()))?;

        Ok(recorder)
    }

    /// The recorder registered with the global `REGISTRY`.
    pub fn global() -> Result<Arc<Self>, TelemetryError> {
        GLOBAL_RECORDER.clone().map_err(TelemetryError::MetricsInit)
    }

    pub fn sent_total(&self, target: &str) -> f64 {
        self.messages_sent.with_label_values(&[target]).get()
    }

    pub fn received_total(&self, module_id: &str) -> f64 {
        self.messages_received.with_label_values(&[module_id]).get()
    }

    pub fn error_total(&self, module_id: &str, code: ErrorCode) -> f64 {
        self.errors
            .with_label_values(&[module_id, code.as_str()])
            .get()
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn record_send(&self, target: &str, latency: Duration) {
        self.messages_sent.with_label_values(&[target]).inc();
        self.send_latency
            .with_label_values(&[target])
            .observe(latency.as_secs_f64());
    }

    fn record_receive(&self, module_id: &str) {
        self.messages_received.with_label_values(&[module_id]).inc();
    }

    fn record_error(&self, module_id: &str, code: ErrorCode) {
        self.errors
            .with_label_values(&[module_id, code.as_str()])
            .inc();
    }

    fn record_replay(&self, module_id: &str, delivered: usize) {
        self.replayed
            .with_label_values(&[module_id])
            .inc_by(delivered as f64);
    }

    fn record_eviction(&self, channel: &str, evicted: usize) {
        self.evicted
            .with_label_values(&[channel])
            .inc_by(evicted as f64);
    }
}

/// Encode all metrics in `registry` in Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Encode the global registry, for a `/metrics` endpoint.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}
