//! # rampart-proto
//!
//! Protocol vocabulary shared between the Rampart coordinator and its
//! enforcement agents.
//!
//! The wire protocol is deliberately plain: text frames over a persistent
//! duplex channel.
//!
//! - agent → coordinator, first frame: the agent's self-declared name
//! - coordinator → agent: a firewall directive line or a JSON advisory
//! - agent → coordinator: `CONFIRM <ip>` acknowledging a rule change
//!
//! This crate owns the parsing and rendering of those frames plus the
//! identifiers both sides agree on. It has no I/O.

pub mod directive;
pub mod error;
pub mod frame;
pub mod types;

pub use directive::{Directive, LowWeightAdvisory};
pub use error::{ProtoError, ProtoResult};
pub use frame::{validate_agent_name, AgentFrame, MAX_AGENT_NAME_LENGTH};
pub use types::TenantId;
