//! # Error Types
//!
//! Stable error codes shared across crates, and the error a bridge reports
//! when delivery fails.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable failure kinds.
///
/// Callers branch on the code, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Operation attempted before a bridge was connected.
    ServiceUnavailable,
    /// Empty target channel on send.
    InvalidTarget,
    /// Message failed structural validation.
    InvalidMessage,
    /// Options failed type/enum validation.
    InvalidOptions,
    /// Subscribe called with a callback that cannot be invoked.
    InvalidCallback,
    /// The bridge failed during send delegation.
    SendFailed,
    /// The bridge failed during subscription registration.
    SubscribeFailed,
    /// The bridge failed while removing a listener.
    UnsubscribeFailed,
}

impl ErrorCode {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InvalidTarget => "INVALID_TARGET",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::InvalidOptions => "INVALID_OPTIONS",
            Self::InvalidCallback => "INVALID_CALLBACK",
            Self::SendFailed => "SEND_FAILED",
            Self::SubscribeFailed => "SUBSCRIBE_FAILED",
            Self::UnsubscribeFailed => "UNSUBSCRIBE_FAILED",
        }
    }

    /// Whether this failure originated in the bridge rather than in input
    /// validation.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::SendFailed | Self::SubscribeFailed | Self::UnsubscribeFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a bridge implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The transport failed to deliver.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The bridge refused the target or module id.
    #[error("Target rejected by bridge: {0}")]
    Rejected(String),

    /// The bridge is shutting down or already gone.
    #[error("Bridge closed")]
    Closed,
}
