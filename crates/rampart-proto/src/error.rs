//! Error types for protocol parsing and rendering.

use thiserror::Error;

/// Errors that can occur while parsing or rendering protocol frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// An inbound frame did not match any known shape.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// An agent name failed validation.
    #[error("invalid agent name: {0}")]
    InvalidAgentName(String),

    /// A tenant identifier could not be parsed.
    #[error("invalid tenant id: {0}")]
    InvalidTenantId(String),

    /// JSON encoding of an advisory failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for ProtoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Result type for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_frame_display() {
        let err = ProtoError::InvalidFrame("garbage".to_string());
        assert!(err.to_string().contains("garbage"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err: ProtoError = json_err.into();
        assert!(matches!(err, ProtoError::Encoding(_)));
    }
}
