//! Domain Layer - Pure logic
//!
//! - Service configuration
//! - Message and option validation
//!
//! RULES:
//! - No I/O operations
//! - No async code

pub mod config;
pub mod validator;

pub use config::{EventServiceConfig, EventServiceConfigBuilder};
pub use validator::{
    validate_envelope, validate_message, validate_message_type, validate_message_value,
    validate_options, validate_options_value, ValidationError, MAX_MESSAGE_TYPE_LEN,
};
