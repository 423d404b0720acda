//! Error types for the agent.

use thiserror::Error;

/// Errors that can occur in the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Connecting to the coordinator failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// Sending a frame failed.
    #[error("send error: {0}")]
    Send(String),

    /// The firewall executor rejected a directive.
    #[error("executor error: {0}")]
    Executor(String),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
