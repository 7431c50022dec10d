//! Error types for the relay.
//!
//! The protocol has no error event, so none of these ever reach a client.
//! They exist so the connection handler can log why an inbound frame was
//! dropped. Lookup misses (unknown user, connection or message) are not
//! errors at all: they are `None` and fall through to the offline path or
//! a silent no-op.

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Reasons an inbound event is dropped.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The frame is not JSON, names an unknown event, or is missing a
    /// required payload field.
    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// `addUser` carried an empty (or all-whitespace) user id.
    #[error("Identity announcement carried an empty user id")]
    EmptyIdentity,

    /// A binary WebSocket frame. The protocol is JSON text only.
    #[error("Binary frames are not supported")]
    UnsupportedFrame,
}

impl RelayError {
    /// Short, stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MalformedEvent(_) => "malformed_event",
            RelayError::EmptyIdentity => "empty_identity",
            RelayError::UnsupportedFrame => "unsupported_frame",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_event_from_serde() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "malformed_event");
        assert!(err.to_string().starts_with("Malformed event"));
    }

    #[test]
    fn test_kinds_are_distinct() {
        assert_ne!(
            RelayError::EmptyIdentity.kind(),
            RelayError::UnsupportedFrame.kind()
        );
    }
}
