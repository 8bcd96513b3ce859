//! # Shared Bus - Local Delivery Plumbing
//!
//! The building blocks an event service wires together:
//!
//! - **`Bridge`**: the host-owned transport contract (external port).
//! - **`InMemoryBridge`**: reference in-process bridge.
//! - **`ReplayQueue`**: bounded per-channel history for late subscribers.
//! - **`SubscriptionRegistry`**: per-channel callback bookkeeping with set
//!   semantics and bulk teardown.
//! - **`MessageCallback`**: reference-counted handler with reference identity.
//!
//! ## Delivery Path
//!
//! ```text
//! ┌──────────────┐  send_message()   ┌──────────────┐   dispatch    ┌──────────────┐
//! │ EventService │ ────────────────→ │    Bridge    │ ────────────→ │  listeners   │
//! │   (m1)       │                   │ (host-owned) │               │  of target   │
//! └──────┬───────┘                   └──────────────┘               └──────────────┘
//!        │ persist
//!        ↓
//! ┌──────────────┐  replay on persistent subscribe
//! │ ReplayQueue  │ ─────────────────────────────────→ new subscriber
//! └──────────────┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bridge;
pub mod callback;
pub mod registry;
pub mod replay_queue;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use bridge::{Bridge, InMemoryBridge};
pub use callback::{CallbackId, CallbackPanic, MessageCallback};
pub use registry::{Registration, SubscriptionRegistry};
pub use replay_queue::{replay_snapshot, replay_snapshot_while, ReplayOutcome, ReplayQueue};

#[cfg(feature = "test-utils")]
pub use testing::{RecordedSend, RecordingBridge};

/// Default per-channel replay bound.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

