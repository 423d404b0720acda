//! Session bookkeeping: which tenants are online, under which agent name.
//!
//! Separate from the [`crate::ConnectionRegistry`] on purpose — the registry
//! answers "can I reach this tenant right now", the ledger keeps a record of
//! sessions for reporting and for resolving the agent label of an event
//! after the channel is gone.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use rampart_proto::TenantId;

/// Whether a tenant's agent session is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The agent's channel is up.
    Online,
    /// The agent disconnected; the record is kept.
    Offline,
}

/// One tenant's agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// The agent's self-declared name.
    pub agent_name: String,
    /// Live or disconnected.
    pub status: SessionStatus,
    /// When the current (or last) session was established.
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity on the session.
    pub last_seen: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the session is live.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status == SessionStatus::Online
    }
}

/// Tracks agent sessions per tenant.
#[derive(Debug, Default)]
pub struct SessionLedger {
    sessions: RwLock<HashMap<TenantId, SessionRecord>>,
}

impl SessionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tenant's agent coming online.
    pub fn mark_online(&self, tenant: TenantId, agent_name: impl Into<String>) {
        let now = Utc::now();
        self.sessions.write().insert(
            tenant,
            SessionRecord {
                agent_name: agent_name.into(),
                status: SessionStatus::Online,
                connected_at: now,
                last_seen: now,
            },
        );
    }

    /// Record a tenant's agent going offline. The record is kept for
    /// reporting; only the status flips.
    pub fn mark_offline(&self, tenant: TenantId) {
        if let Some(record) = self.sessions.write().get_mut(&tenant) {
            record.status = SessionStatus::Offline;
            record.last_seen = Utc::now();
        }
    }

    /// Record inbound activity on a tenant's session.
    pub fn touch(&self, tenant: TenantId) {
        if let Some(record) = self.sessions.write().get_mut(&tenant) {
            record.last_seen = Utc::now();
        }
    }

    /// The session record for a tenant, if any was ever established.
    #[must_use]
    pub fn session(&self, tenant: TenantId) -> Option<SessionRecord> {
        self.sessions.read().get(&tenant).cloned()
    }

    /// Whether the tenant's agent is currently online.
    #[must_use]
    pub fn is_online(&self, tenant: TenantId) -> bool {
        self.sessions
            .read()
            .get(&tenant)
            .is_some_and(SessionRecord::is_online)
    }

    /// The agent name to attribute a tenant's events to, `"unknown"` when no
    /// session was ever recorded.
    #[must_use]
    pub fn agent_label(&self, tenant: TenantId) -> String {
        self.sessions
            .read()
            .get(&tenant)
            .map_or_else(|| "unknown".to_string(), |r| r.agent_name.clone())
    }

    /// All currently online sessions.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<(TenantId, SessionRecord)> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, r)| r.is_online())
            .map(|(t, r)| (*t, r.clone()))
            .collect()
    }
}
