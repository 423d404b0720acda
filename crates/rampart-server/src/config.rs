//! Server and channel configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default bound on concurrent agent connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;

/// Default time an agent has to send its handshake frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for a `CONFIRM` acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of delivery attempts for a reliable send.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default interface name substituted into firewall directives.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Per-channel reliable-delivery configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// How long one attempt waits for the agent's `CONFIRM`.
    pub ack_timeout: Duration,
    /// How many attempts before the directive is dropped.
    pub max_attempts: u32,
}

impl ChannelConfig {
    /// Create a channel configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the acknowledgement timeout.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the delivery attempt bound.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the coordinator server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to.
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent agent connections.
    pub max_connections: usize,
    /// Time an agent has to send its handshake frame.
    pub handshake_timeout: Duration,
    /// Interface name substituted into firewall directives.
    pub interface: String,
    /// Reliable-delivery settings for every channel.
    pub channel: ChannelConfig,
}

impl ServerConfig {
    /// Create a server configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            interface: DEFAULT_INTERFACE.to_string(),
            channel: ChannelConfig::new(),
        }
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the directive interface name.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    /// Set the channel configuration.
    #[must_use]
    pub const fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }
}
