//! Ports Layer
//!
//! - Driving port (inbound): `EventServiceApi`, the operations callers use
//! - Driven port (outbound): `Bridge`, the host transport

pub mod inbound;
pub mod outbound;

pub use inbound::EventServiceApi;
pub use outbound::{Bridge, BridgeError};
