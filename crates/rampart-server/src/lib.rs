//! # rampart-server
//!
//! The Rampart coordinator's command-and-control surface: a WebSocket
//! server agents connect to, the per-connection channel state machine with
//! reliable directive delivery, and the [`Coordinator`] that ties scoring
//! to dispatch.
//!
//! ## Connection life
//!
//! 1. The agent connects with `Authorization: Bearer <token>`; the upgrade
//!    callback resolves the token to a [`rampart_proto::TenantId`] or
//!    rejects with 401.
//! 2. The first text frame is the agent's self-declared name; a malformed
//!    or missing handshake closes the channel before it is registered.
//! 3. The channel registers into the
//!    [`rampart_dispatch::ConnectionRegistry`] (replacing any prior channel
//!    for the tenant) and pumps inbound frames, resolving `CONFIRM <ip>`
//!    acknowledgements.
//! 4. On close it unregisters (only if still the registered instance) and
//!    releases every pending acknowledgement wait.

pub mod auth;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod server;

pub use auth::{StaticTokenAuthenticator, TenantAuthenticator};
pub use channel::{run_channel, AckTable, AgentChannel, ChannelSession, ChannelState, FrameTransport, WsTransport};
pub use config::{ChannelConfig, ServerConfig};
pub use coordinator::Coordinator;
pub use error::{ServerError, ServerResult, TransportError};
pub use server::CoordinatorServer;
