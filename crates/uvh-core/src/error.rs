//! Error types.
//!
//! Nothing here is fatal to a session: message errors mean "drop the message",
//! config errors mean "keep the defaults".

use thiserror::Error;

/// Why an inbound cross-frame message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload lacks the `uvh: true` marker")]
    MissingMarker,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("malformed field: {0}")]
    Malformed(String),
    #[error("field `{field}` out of range")]
    OutOfRange { field: &'static str },
}

/// Failure to load a [`SessionConfig`](crate::config::SessionConfig) override.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
