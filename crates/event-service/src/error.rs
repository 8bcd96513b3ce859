//! Error types for the event service

use crate::domain::validator::ValidationError;
use shared_types::{BridgeError, ErrorCode};
use thiserror::Error;

/// Errors returned by `EventService` operations.
///
/// Every variant maps to a stable [`ErrorCode`]; branch on `code()`, not on
/// the message text.
#[derive(Debug, Clone, Error)]
pub enum EventServiceError {
    #[error("Event service for module '{module_id}' has no bridge")]
    ServiceUnavailable { module_id: String },

    #[error("Invalid target module id: {0:?}")]
    InvalidTarget(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[source] ValidationError),

    #[error("Invalid delivery options: {0}")]
    InvalidOptions(#[source] ValidationError),

    #[error("Callback cannot receive messages")]
    InvalidCallback,

    #[error("Bridge failed to send to '{target}'")]
    SendFailed {
        target: String,
        #[source]
        source: BridgeError,
    },

    #[error("Bridge failed to subscribe module '{module_id}'")]
    SubscribeFailed {
        module_id: String,
        #[source]
        source: BridgeError,
    },

    #[error("Bridge failed to unsubscribe from module '{module_id}'")]
    UnsubscribeFailed {
        module_id: String,
        #[source]
        source: BridgeError,
    },
}

impl EventServiceError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            Self::InvalidTarget(_) => ErrorCode::InvalidTarget,
            Self::InvalidMessage(_) => ErrorCode::InvalidMessage,
            Self::InvalidOptions(_) => ErrorCode::InvalidOptions,
            Self::InvalidCallback => ErrorCode::InvalidCallback,
            Self::SendFailed { .. } => ErrorCode::SendFailed,
            Self::SubscribeFailed { .. } => ErrorCode::SubscribeFailed,
            Self::UnsubscribeFailed { .. } => ErrorCode::UnsubscribeFailed,
        }
    }

    /// The underlying bridge failure, for transport errors.
    #[must_use]
    pub fn bridge_error(&self) -> Option<&BridgeError> {
        match self {
            Self::SendFailed { source, .. }
            | Self::SubscribeFailed { source, .. }
            | Self::UnsubscribeFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors building an `EventServiceConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("plugin_id cannot be empty")]
    EmptyPluginId,

    #[error("module_id cannot be empty")]
    EmptyModuleId,

    #[error("max_queue_size cannot be 0")]
    ZeroQueueSize,

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}
