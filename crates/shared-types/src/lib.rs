//! # Shared Types Crate
//!
//! This crate contains the event `Envelope<T>`, delivery options, stable
//! error codes and the identifier generator used by every crate in the
//! event bridge.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: the wire shape of an event is defined here.
//! - **Stamped Identity**: callers provide an `OutgoingMessage<T>`; id,
//!   source, timestamp and metadata are stamped by the event service.
//! - **Opaque Content**: `content: T` is never interpreted by the bus.

pub mod envelope;
pub mod errors;
pub mod ids;

pub use envelope::{
    iso_timestamp, BroadcastTag, DeliveryOptions, Envelope, EnvelopeMetadata, OutgoingMessage,
    Priority, SourceIdentity, TargetAddress,
};
pub use errors::{BridgeError, ErrorCode};
pub use ids::{broadcast_id, event_id, generate_id, message_id};
