//! The channel seam: what dispatch logic needs from a live agent connection.

use std::collections::HashSet;
use std::net::IpAddr;

use async_trait::async_trait;
use parking_lot::Mutex;

use rampart_proto::{Directive, TenantId};

/// Outcome of delivering one directive over a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The agent confirmed the rule change.
    Acknowledged,
    /// The advisory was written; no acknowledgement expected.
    Sent,
    /// Every attempt timed out or failed transiently; the directive was
    /// dropped. Non-fatal — the next crossing re-derives the decision.
    Dropped,
    /// The transport reported the connection closed; retries were aborted.
    Closed,
}

impl DeliveryOutcome {
    /// Whether the directive reached the wire at least once with a positive
    /// result.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Sent)
    }
}

/// A live connection to one tenant's enforcement agent.
///
/// Implemented over a WebSocket by the server; tests substitute fakes. The
/// trait carries the channel's identity, its per-channel rule state, and
/// reliable delivery.
#[async_trait]
pub trait AgentLink: Send + Sync {
    /// The tenant this channel belongs to.
    fn tenant(&self) -> TenantId;

    /// The agent's self-declared name from the handshake.
    fn agent_name(&self) -> &str;

    /// The set of addresses the remote agent currently believes are blocked.
    fn rules(&self) -> &RuleState;

    /// Deliver one directive. Block/unblock wait for acknowledgement with
    /// bounded retry; advisories are a single send.
    async fn deliver(&self, directive: Directive) -> DeliveryOutcome;
}

/// Addresses the remote agent currently believes are blocked.
///
/// Lives on the channel, so a reconnecting agent starts from a clean slate —
/// matching the agent's actual firewall state after a restart is its own
/// problem, and the next crossing converges both sides.
#[derive(Debug, Default)]
pub struct RuleState {
    applied: Mutex<HashSet<IpAddr>>,
}

impl RuleState {
    /// Create an empty rule state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a block rule is recorded for `ip`.
    #[must_use]
    pub fn is_applied(&self, ip: IpAddr) -> bool {
        self.applied.lock().contains(&ip)
    }

    /// Record that a block rule was sent for `ip`.
    pub fn mark_applied(&self, ip: IpAddr) {
        self.applied.lock().insert(ip);
    }

    /// Clear the block rule record for `ip`.
    pub fn clear(&self, ip: IpAddr) {
        self.applied.lock().remove(&ip);
    }

    /// Number of recorded rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.lock().len()
    }

    /// Whether no rules are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.lock().is_empty()
    }

    /// Snapshot of the recorded addresses.
    #[must_use]
    pub fn snapshot(&self) -> Vec<IpAddr> {
        self.applied.lock().iter().copied().collect()
    }
}
