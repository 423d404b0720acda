//! Agent configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

fn default_interface() -> String {
    "eth0".to_string()
}

/// Configuration loaded from the agent's JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Coordinator base URL (`http(s)://` or `ws(s)://`).
    pub server_url: String,
    /// Bearer credential issued by the coordinator's auth layer.
    pub token: String,
    /// Name this agent declares in its handshake.
    pub agent_name: String,
    /// Interface the host firewall rules apply to.
    #[serde(default = "default_interface")]
    pub interface: String,
}

impl AgentConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Config` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> AgentResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AgentError::Config(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| AgentError::Config(e.to_string()))
    }

    /// The WebSocket URL to dial, derived from `server_url`.
    ///
    /// `https://` becomes `wss://`, `http://` becomes `ws://`, a bare host
    /// gets `ws://`; the `/ws` path is appended unless the URL already
    /// carries it.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let base = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://") {
            self.server_url.clone()
        } else {
            format!("ws://{}", self.server_url)
        };

        if base.ends_with("/ws") {
            base
        } else {
            format!("{}/ws", base.trim_end_matches('/'))
        }
    }
}
