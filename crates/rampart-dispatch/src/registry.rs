//! Tenant → live channel registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use rampart_proto::TenantId;

use crate::link::AgentLink;

/// Tracks which tenant currently has a live agent channel.
///
/// At most one channel per tenant: registering a new channel for a tenant
/// that already has one replaces it — last handshake wins, and the registry
/// is the sole source of truth for reachability. The lock is held only for
/// map access, never across channel I/O.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<TenantId, Arc<dyn AgentLink>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for its tenant, replacing any prior channel.
    ///
    /// Returns the replaced channel, if there was one, so the caller can log
    /// or tear it down.
    pub fn register(&self, link: Arc<dyn AgentLink>) -> Option<Arc<dyn AgentLink>> {
        let tenant = link.tenant();
        let replaced = self.channels.write().insert(tenant, link);
        if replaced.is_some() {
            debug!(tenant = %tenant, "Replaced existing channel registration");
        }
        replaced
    }

    /// Look up the live channel for a tenant.
    #[must_use]
    pub fn lookup(&self, tenant: TenantId) -> Option<Arc<dyn AgentLink>> {
        self.channels.read().get(&tenant).cloned()
    }

    /// Unregister a channel, but only if `link` is still the registered
    /// instance for its tenant.
    ///
    /// A disconnect handler for a channel that has already been replaced by
    /// a newer handshake must not evict its successor; identity comparison
    /// makes that race a no-op. Returns whether an eviction happened.
    pub fn unregister(&self, tenant: TenantId, link: &Arc<dyn AgentLink>) -> bool {
        let mut channels = self.channels.write();
        match channels.get(&tenant) {
            Some(current) if Arc::ptr_eq(current, link) => {
                channels.remove(&tenant);
                true
            }
            Some(_) => {
                debug!(tenant = %tenant, "Stale unregister ignored");
                false
            }
            None => false,
        }
    }

    /// Number of live channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether no channels are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Tenants that currently have a live channel.
    #[must_use]
    pub fn tenants(&self) -> Vec<TenantId> {
        self.channels.read().keys().copied().collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("channels", &self.len())
            .finish()
    }
}
