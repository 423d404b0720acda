//! Error types for the coordinator server.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur in the coordinator server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// WebSocket error occurred.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The peer violated the agent protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The token file could not be read or parsed.
    #[error("token file error: {0}")]
    TokenFile(String),

    /// Reputation store failure.
    #[error(transparent)]
    Store(#[from] rampart_reputation::StoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors reported by a channel's outbound transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is already closed; retrying is pointless.
    #[error("connection closed")]
    Closed,

    /// A transient transport failure.
    #[error("transport error: {0}")]
    Io(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            other => Self::Io(other.to_string()),
        }
    }
}
