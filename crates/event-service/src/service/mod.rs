//! Service Layer
//!
//! Orchestrates validation, the replay queue, the subscription registry and
//! the bridge.

pub mod broadcast;
pub(crate) mod delivery;
pub mod event_service;

pub use broadcast::{
    BroadcastReport, ConfirmationSummary, ConfirmationTracker, DeliveryStatus, TargetOutcome,
};
pub use event_service::{create_event_service, EventService};
