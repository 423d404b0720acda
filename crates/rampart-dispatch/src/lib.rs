//! # rampart-dispatch
//!
//! The delivery half of the Rampart coordinator: knows which tenant has a
//! live agent channel and turns threshold crossings into directives on
//! exactly that channel.
//!
//! - [`AgentLink`] — the seam between dispatch logic and the transport; the
//!   server implements it over a WebSocket, tests implement it with fakes
//! - [`RuleState`] — the set of addresses a channel's remote agent currently
//!   believes are blocked, guarding against duplicate rule application
//! - [`ConnectionRegistry`] — tenant → live channel, last handshake wins
//! - [`SessionLedger`] — online/offline session bookkeeping
//! - [`Dispatcher`] — crossing in, directive delivery out
//!
//! Nothing here blocks a reporter: dispatch is spawned by the caller and a
//! tenant without a channel is a normal operating state.

pub mod dispatcher;
pub mod link;
pub mod registry;
pub mod sessions;

pub use dispatcher::Dispatcher;
pub use link::{AgentLink, DeliveryOutcome, RuleState};
pub use registry::ConnectionRegistry;
pub use sessions::{SessionLedger, SessionRecord, SessionStatus};
