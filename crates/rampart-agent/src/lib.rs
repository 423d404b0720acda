//! # rampart-agent
//!
//! The enforcement side of Rampart. The agent connects to the coordinator
//! with a bearer credential, declares its name, and then does exactly three
//! things for the rest of its life:
//!
//! 1. receive directives,
//! 2. hand them to the host's firewall executor,
//! 3. confirm applied block/unblock rules with `CONFIRM <ip>`.
//!
//! Lost connections are re-established forever with capped exponential
//! backoff. Actually mutating the host firewall is deliberately behind the
//! [`FirewallExecutor`] seam; the shipped executor only logs.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;

pub use backoff::ReconnectPolicy;
pub use client::{AgentClient, FirewallExecutor, LoggingExecutor};
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
