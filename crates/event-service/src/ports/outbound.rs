//! Outbound Ports (Driven Ports)
//!
//! The only external capability the service consumes is the host bridge.
//! It is defined in `shared-bus` so that bridges can be implemented without
//! depending on this crate.

pub use shared_bus::Bridge;
pub use shared_types::BridgeError;
