//! Message and option validation
//!
//! Validation runs before anything touches the registry, the queue or the
//! bridge. Invalid input is refused, never coerced into defaults.
//!
//! Two layers:
//! - typed checks on `OutgoingMessage<T>` (the message type discriminator)
//! - structural checks on untyped JSON handed over by a host
//!   (`validate_message_value`, `validate_options_value`)

use serde_json::{Map, Value};
use shared_types::{DeliveryOptions, OutgoingMessage, Priority};
use thiserror::Error;
use tracing::warn;

/// Longest accepted message type, in bytes.
pub const MAX_MESSAGE_TYPE_LEN: usize = 256;

/// Fields stamped by the service. Caller-supplied copies are discarded.
pub const RESERVED_FIELDS: [&str; 6] = ["type", "id", "source", "target", "timestamp", "metadata"];

/// Why a message or an options record was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{what} must be a JSON object")]
    NotAnObject { what: &'static str },

    #[error("message type is missing")]
    MissingType,

    #[error("message type must be a string")]
    TypeNotString,

    #[error("message type is empty")]
    EmptyType,

    #[error("message type is {len} bytes, max {max}")]
    TypeTooLong { len: usize, max: usize },

    #[error("option '{field}' must be a {expected}")]
    WrongFieldType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown priority {0:?}")]
    UnknownPriority(String),
}

/// Check the application discriminator of a typed message.
pub fn validate_message_type(message_type: &str) -> Result<(), ValidationError> {
    if message_type.trim().is_empty() {
        return Err(ValidationError::EmptyType);
    }
    if message_type.len() > MAX_MESSAGE_TYPE_LEN {
        return Err(ValidationError::TypeTooLong {
            len: message_type.len(),
            max: MAX_MESSAGE_TYPE_LEN,
        });
    }
    Ok(())
}

/// Check a typed outgoing message.
pub fn validate_message<T>(message: &OutgoingMessage<T>) -> Result<(), ValidationError> {
    validate_message_type(&message.message_type)
}

/// Parse an untyped message into an `OutgoingMessage<Value>`.
///
/// The candidate must be an object with a non-empty string `type`. Its
/// payload is the `content` field when present, otherwise the object with
/// every reserved field removed.
pub fn validate_message_value(candidate: &Value) -> Result<OutgoingMessage<Value>, ValidationError> {
    let object = candidate
        .as_object()
        .ok_or(ValidationError::NotAnObject { what: "message" })?;

    let message_type = match object.get("type") {
        None | Some(Value::Null) => return Err(ValidationError::MissingType),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(ValidationError::TypeNotString),
    };
    validate_message_type(&message_type)?;

    let content = match object.get("content") {
        Some(content) => content.clone(),
        None => {
            let payload: Map<String, Value> = object
                .iter()
                .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Value::Object(payload)
        }
    };

    Ok(OutgoingMessage::new(message_type, content))
}

/// Parse untyped delivery options.
///
/// `null` means default options. Absent flags default to `false`; present
/// ones must be booleans. `priority` must be one of `low`, `normal`, `high`.
pub fn validate_options_value(candidate: &Value) -> Result<DeliveryOptions, ValidationError> {
    let object = match candidate {
        Value::Null => return Ok(DeliveryOptions::default()),
        Value::Object(object) => object,
        _ => return Err(ValidationError::NotAnObject { what: "options" }),
    };

    let remote = bool_field(object, "remote")?;
    let persist = bool_field(object, "persist")?;
    let priority = match object.get("priority") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(
            Priority::parse(raw).ok_or_else(|| ValidationError::UnknownPriority(raw.clone()))?,
        ),
        Some(_) => {
            return Err(ValidationError::WrongFieldType {
                field: "priority",
                expected: "string",
            })
        }
    };

    Ok(DeliveryOptions {
        remote,
        persist,
        priority,
    })
}

fn bool_field(object: &Map<String, Value>, field: &'static str) -> Result<bool, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(ValidationError::WrongFieldType {
            field,
            expected: "boolean",
        }),
    }
}

/// Advisory check: `false` (and a warning) when the candidate is not a
/// valid message.
pub fn validate_envelope(candidate: &Value) -> bool {
    match validate_message_value(candidate) {
        Ok(_) => true,
        Err(error) => {
            warn!(%error, "Rejected message");
            false
        }
    }
}

/// Advisory check: `false` (and a warning) when the options are malformed.
pub fn validate_options(candidate: &Value) -> bool {
    match validate_options_value(candidate) {
        Ok(_) => true,
        Err(error) => {
            warn!(%error, "Rejected delivery options");
            false
        }
    }
}
