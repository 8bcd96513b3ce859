//! # Event Service
//!
//! Typed local event bus for one module: send, subscribe, broadcast, with a
//! bounded replay buffer for late subscribers. Actual delivery is delegated
//! to a host-owned `Bridge`.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): configuration and validation, no I/O
//!   - `EventServiceConfig` / `EventServiceConfigBuilder`
//!   - message and option validators
//!
//! - **Ports Layer** (`ports/`): trait definitions
//!   - `EventServiceApi`: driving port (inbound API)
//!   - `Bridge`: driven port (host transport)
//!
//! - **Service Layer** (`service/`): orchestration
//!   - `EventService`: implements `EventServiceApi`
//!   - `BroadcastReport`, `ConfirmationTracker`
//!
//! ## Invariants
//!
//! - Envelope id, source, timestamp and metadata are always stamped by the
//!   service, never taken from the caller.
//! - The same callback subscribed twice is delivered to once.
//! - A persistent subscriber receives the buffered backlog, oldest first,
//!   before `subscribe_to_messages` returns and before any live message.
//! - No delivery reaches a callback after its unsubscribe returned.
//! - Bridge failures are counted and returned, never swallowed.
//!
//! ## Usage Example
//!
//! ```ignore
//! use event_service::{create_event_service, MessageCallback};
//! use shared_bus::{Bridge, InMemoryBridge};
//! use shared_types::{DeliveryOptions, OutgoingMessage};
//! use std::sync::Arc;
//!
//! let bridge: Arc<dyn Bridge<String>> = Arc::new(InMemoryBridge::new());
//!
//! let chat = create_event_service::<String>("demo", "chat")?;
//! chat.set_bridge(bridge.clone());
//!
//! let monitor = create_event_service::<String>("demo", "monitor")?;
//! monitor.set_bridge(bridge.clone());
//! let _subscription = monitor
//!     .subscribe_to_messages(
//!         MessageCallback::new(|e| println!("{}: {}", e.message_type, e.content)),
//!         DeliveryOptions::persistent(),
//!     )
//!     .await?;
//!
//! chat.send_message(
//!     "monitor",
//!     OutgoingMessage::new("chat.line", "hello".to_string()),
//!     DeliveryOptions::persistent(),
//! )
//! .await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod subscription;

// Re-exports for convenience
pub use domain::{EventServiceConfig, EventServiceConfigBuilder, ValidationError};
pub use error::{ConfigError, EventServiceError};
pub use metrics::{
    ConnectionState, MetricsRecorder, NoOpMetrics, PerformanceCounters, PerformanceMetrics,
    ServiceStats,
};
pub use ports::{Bridge, BridgeError, EventServiceApi};
pub use service::{
    create_event_service, BroadcastReport, ConfirmationSummary, ConfirmationTracker,
    DeliveryStatus, EventService, TargetOutcome,
};
pub use shared_bus::MessageCallback;
pub use subscription::{EnvelopeStream, SubscriptionHandle};
