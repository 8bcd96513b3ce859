//! # Bridge Telemetry
//!
//! Logging and metrics for processes hosting event services.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, JSON in containers
//!   and human-readable text in development
//! - **Metrics**: a Prometheus-backed `MetricsRecorder` that event services
//!   report sends, receives, errors, replays and evictions to
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_telemetry::{init_telemetry, TelemetryConfig};
//! use event_service::{EventService, EventServiceConfig};
//!
//! let guard = init_telemetry(TelemetryConfig::from_env())?;
//! let service = EventService::<String>::with_metrics(
//!     EventServiceConfig::new("demo", "chat")?,
//!     guard.recorder(),
//! )?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `event-bridge` | Service name in log records |
//! | `EB_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `EB_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `EB_JSON_LOGS` | `false` | JSON logs (default on in containers) |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{encode_metrics, encode_registry, PrometheusRecorder, REGISTRY};
pub use tracing_setup::{env_filter, init_tracing};

use std::sync::Arc;
use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and the global metrics recorder.
///
/// Returns a guard that should be held for the lifetime of the process. Fails
/// if a global tracing subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first, so a bad registry surfaces before logging is global
    let recorder = PrometheusRecorder::global()?;

    init_tracing(&config)?;

    Ok(TelemetryGuard { config, recorder })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    config: TelemetryConfig,
    recorder: Arc<PrometheusRecorder>,
}

impl TelemetryGuard {
    /// Recorder to pass to `EventService::with_metrics`.
    pub fn recorder(&self) -> Arc<PrometheusRecorder> {
        Arc::clone(&self.recorder)
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.config.service_name, "Shutting down telemetry...");
    }
}

/// Span carrying the module a piece of work belongs to.
///
/// ```rust,ignore
/// let _span = module_span!("replay", module_id = "monitor").entered();
/// ```
#[macro_export]
macro_rules! module_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
