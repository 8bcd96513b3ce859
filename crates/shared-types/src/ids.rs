//! # Identifier Generator
//!
//! IDs have the form `{prefix}-{base36 millis}-{5-char suffix}`.
//!
//! Uniqueness is probabilistic: the millisecond timestamp separates IDs
//! across time and 36^5 random suffixes separate IDs within one millisecond.
//! There is no global counter and the IDs are not meant to be unguessable.

use chrono::Utc;
use rand::Rng;

/// Prefix for message ids.
pub const MESSAGE_ID_PREFIX: &str = "msg";

/// Prefix for broadcast correlation ids.
pub const BROADCAST_ID_PREFIX: &str = "broadcast";

/// Prefix for generic event ids.
pub const EVENT_ID_PREFIX: &str = "evt";

/// Length of the random suffix.
pub const SUFFIX_LEN: usize = 5;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a new identifier with the given prefix.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect();
    format!("{prefix}-{}-{suffix}", to_base36(millis))
}

/// Generate a message id.
#[must_use]
pub fn message_id() -> String {
    generate_id(MESSAGE_ID_PREFIX)
}

/// Generate a broadcast correlation id.
#[must_use]
pub fn broadcast_id() -> String {
    generate_id(BROADCAST_ID_PREFIX)
}

/// Generate a generic event id.
#[must_use]
pub fn event_id() -> String {
    generate_id(EVENT_ID_PREFIX)
}

/// Encode a number in lowercase base 36.
#[must_use]
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
