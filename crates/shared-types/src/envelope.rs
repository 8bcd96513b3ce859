//! # Message `Envelope`
//!
//! The universal wrapper for every event exchanged between modules.
//!
//! ## Envelope Properties
//!
//! - **Identity**: `id` is generated at send time and never reused.
//! - **Stamping Authority**: `source`, `id`, `timestamp` and `metadata` are
//!   written by the event service. A caller only supplies an
//!   [`OutgoingMessage`] (type + opaque content) and cannot reach those fields.
//! - **Immutability**: an envelope is never mutated after stamping. Copies
//!   handed to subscribers and to the replay queue are shared behind `Arc`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the module that produced an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIdentity {
    /// The plugin the sending module belongs to.
    pub plugin_id: String,
    /// The sending module. Also the channel the module listens on.
    pub module_id: String,
}

impl SourceIdentity {
    /// Create a new source identity.
    pub fn new(plugin_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            module_id: module_id.into(),
        }
    }
}

/// The logical channel an envelope is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAddress {
    /// Target module id.
    pub module_id: String,
}

/// Delivery priority hint forwarded to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Parse the wire representation. Unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Per-call delivery options.
///
/// - `remote`: the bridge should also fan the message out to remote targets.
/// - `persist`: the stamped envelope is appended to the replay queue of its
///   target channel (sends), or buffered history is replayed to the new
///   callback (subscribes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryOptions {
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub persist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl DeliveryOptions {
    /// Local, non-persistent delivery (the default).
    #[must_use]
    pub fn local() -> Self {
        Self::default()
    }

    /// Local delivery with replay persistence.
    #[must_use]
    pub fn persistent() -> Self {
        Self {
            persist: true,
            ..Self::default()
        }
    }

    /// Builder-style method to set the remote flag
    #[must_use]
    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    /// Builder-style method to set the persist flag
    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Builder-style method to set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Correlation data attached to every envelope produced by a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastTag {
    /// Correlation id shared by all envelopes of one broadcast.
    pub broadcast_id: String,
    /// Every target of the broadcast, in request order.
    pub targets: Vec<String>,
    /// The target this particular envelope was addressed to.
    pub current_target: String,
}

/// Diagnostic data added by the event service, never by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub sent_at: String,
    pub message_id: String,
    pub options: DeliveryOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<BroadcastTag>,
}

/// What a caller hands to the event service: a type discriminator and an
/// opaque payload. Everything else on the envelope is stamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage<T> {
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: T,
}

impl<T> OutgoingMessage<T> {
    /// Create a new outgoing message.
    pub fn new(message_type: impl Into<String>, content: T) -> Self {
        Self {
            message_type: message_type.into(),
            content,
        }
    }
}

/// The stamped, immutable event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Unique message id.
    pub id: String,

    /// Application-defined event discriminator. Never empty.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Sender identity, taken from the sending service.
    pub source: SourceIdentity,

    /// Addressed channel.
    pub target: TargetAddress,

    /// Opaque application payload. Never interpreted by the bus.
    pub content: T,

    /// ISO-8601 send time.
    pub timestamp: String,

    pub metadata: EnvelopeMetadata,
}

impl<T> Envelope<T> {
    /// Stamp a caller-supplied message.
    ///
    /// The id, the timestamps and the source identity all come from the
    /// arguments; nothing inside `message.content` is consulted.
    #[must_use]
    pub fn stamp(
        id: String,
        source: SourceIdentity,
        target: impl Into<String>,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
        broadcast: Option<BroadcastTag>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let timestamp = iso_timestamp(sent_at);
        Self {
            metadata: EnvelopeMetadata {
                sent_at: timestamp.clone(),
                message_id: id.clone(),
                options,
                broadcast,
            },
            id,
            message_type: message.message_type,
            source,
            target: TargetAddress {
                module_id: target.into(),
            },
            content: message.content,
            timestamp,
        }
    }

    /// The channel this envelope is addressed to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.target.module_id
    }

    /// Broadcast correlation id, if this envelope belongs to a broadcast.
    #[must_use]
    pub fn broadcast_id(&self) -> Option<&str> {
        self.metadata
            .broadcast
            .as_ref()
            .map(|tag| tag.broadcast_id.as_str())
    }

    /// Whether this envelope was sent with `persist` set.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.metadata.options.persist
    }
}

/// Format a UTC instant as ISO-8601 with millisecond precision.
#[must_use]
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
